//! Hybrid score fusion
//!
//! Dense distances and sparse scores live on incompatible scales, so both
//! are min-max normalized over the candidate set being fused before the
//! weighted combination. Dense cosine distances are inverted during
//! normalization (smaller distance, higher similarity); this works for any
//! distance range and sidesteps assuming distances fit [0, 1].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid alpha {0}: must be within [0, 1]")]
    InvalidAlpha(f32),

    #[error("Invalid epsilon {0}: must be positive")]
    InvalidEpsilon(f32),
}

/// Configuration for score fusion
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// Dense weight in [0, 1]; sparse weight is 1 - alpha
    pub alpha: f32,
    /// Added to min-max denominators to avoid division by zero
    pub epsilon: f32,
}

impl FusionConfig {
    pub fn new(alpha: f32, epsilon: f32) -> Result<Self, FusionError> {
        if !(0.0..=1.0).contains(&alpha) || !alpha.is_finite() {
            return Err(FusionError::InvalidAlpha(alpha));
        }
        if epsilon <= 0.0 || !epsilon.is_finite() {
            return Err(FusionError::InvalidEpsilon(epsilon));
        }
        Ok(Self { alpha, epsilon })
    }
}

/// A passage entering fusion with its per-index scores
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub id: u64,
    /// Raw dense distance; None when the passage fell outside the dense
    /// top-N, which fuses as dense similarity 0
    pub dense_distance: Option<f32>,
    /// Raw sparse score; exactly 0 when no query term matches
    pub sparse_score: f32,
}

/// Fuse candidate scores into one ranking.
///
/// `alpha * dense_similarity + (1 - alpha) * sparse_similarity`, both
/// normalized to [0, 1] by min-max over this candidate set. Returns
/// (id, fused score) sorted by score descending, ties broken by ascending
/// passage id.
pub fn fuse(candidates: &[Candidate], config: &FusionConfig) -> Vec<(u64, f32)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let sparse_min = candidates.iter().map(|c| c.sparse_score).fold(f32::INFINITY, f32::min);
    let sparse_max = candidates.iter().map(|c| c.sparse_score).fold(f32::NEG_INFINITY, f32::max);

    let known: Vec<f32> = candidates.iter().filter_map(|c| c.dense_distance).collect();
    let dense_min = known.iter().copied().fold(f32::INFINITY, f32::min);
    let dense_max = known.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut fused: Vec<(u64, f32)> = candidates
        .iter()
        .map(|c| {
            let sparse_sim = (c.sparse_score - sparse_min) / (sparse_max - sparse_min + config.epsilon);
            let dense_sim = match c.dense_distance {
                Some(d) => (dense_max - d) / (dense_max - dense_min + config.epsilon),
                None => 0.0,
            };
            let score = config.alpha * dense_sim + (1.0 - config.alpha) * sparse_sim;
            (c.id, score)
        })
        .collect();

    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    fused
}
