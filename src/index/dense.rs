//! Exact dense vector index
//!
//! Stores one L2-normalized embedding per passage and answers k-nearest
//! queries with an exact cosine-distance scan. Exhaustive search keeps
//! results fully deterministic (ties break on ascending passage id) and
//! makes the persist/load round trip bit-for-bit reproducible.

use crate::corpus::Passage;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DenseIndexError {
    #[error("Embedding failed during build: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Build superseded by a newer ingestion")]
    Superseded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt index file: {0}")]
    Corrupt(String),
}

/// Distance metric of the dense index.
///
/// Cosine distance `1 - dot(a, b)` over L2-normalized vectors, so raw
/// distances fall in [0, 2] with smaller meaning more similar. Fusion
/// normalizes distances over the candidate set rather than assuming a
/// [0, 1] range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseEntry {
    id: u64,
    vector: Vec<f32>,
}

/// Exact dense index over passage embeddings
#[derive(Debug, Serialize, Deserialize)]
pub struct DenseIndex {
    generation: Uuid,
    dimension: usize,
    metric: DistanceMetric,
    /// Entries in ascending id order
    entries: Vec<DenseEntry>,
}

impl DenseIndex {
    /// Embed every passage once and build the index.
    ///
    /// Any gateway failure aborts the whole build: a half-built index must
    /// never serve queries, since the fuser assumes a complete join.
    /// `should_abort` is polled between embedding batches so a superseded
    /// build wastes at most one batch.
    pub fn build(
        generation: Uuid,
        passages: &[Passage],
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
        should_abort: &dyn Fn() -> bool,
    ) -> Result<Self, DenseIndexError> {
        let dimension = provider.dimension();
        let mut entries = Vec::with_capacity(passages.len());

        for batch in passages.chunks(batch_size.max(1)) {
            if should_abort() {
                return Err(DenseIndexError::Superseded);
            }

            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let embeddings = provider.embed_batch(&texts)?;

            for (passage, mut vector) in batch.iter().zip(embeddings) {
                if vector.len() != dimension {
                    return Err(DenseIndexError::InvalidDimension {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
                normalize(&mut vector);
                entries.push(DenseEntry {
                    id: passage.id,
                    vector,
                });
            }
        }

        entries.sort_by_key(|e| e.id);

        Ok(Self {
            generation,
            dimension,
            metric: DistanceMetric::Cosine,
            entries,
        })
    }

    /// K nearest passages by cosine distance.
    ///
    /// Returns (id, distance) ascending by distance, ties broken by
    /// ascending id. Asking for more results than indexed passages returns
    /// everything rather than failing.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, DenseIndexError> {
        if query.len() != self.dimension {
            return Err(DenseIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut results: Vec<(u64, f32)> = self
            .entries
            .iter()
            .map(|e| (e.id, 1.0 - dot(&e.vector, &query)))
            .collect();

        results.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        results.truncate(k);
        Ok(results)
    }

    pub fn generation(&self) -> Uuid {
        self.generation
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the index to disk as JSON
    pub fn persist(&self, path: &Path) -> Result<(), DenseIndexError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a persisted index, verifying internal consistency
    pub fn load(path: &Path) -> Result<Self, DenseIndexError> {
        let file = std::fs::File::open(path)?;
        let index: Self = serde_json::from_reader(std::io::BufReader::new(file))?;

        for entry in &index.entries {
            if entry.vector.len() != index.dimension {
                return Err(DenseIndexError::Corrupt(format!(
                    "entry {} has dimension {}, index expects {}",
                    entry.id,
                    entry.vector.len(),
                    index.dimension
                )));
            }
        }
        if !index.entries.windows(2).all(|w| w[0].id < w[1].id) {
            return Err(DenseIndexError::Corrupt(
                "entries are not in ascending id order".to_string(),
            ));
        }

        Ok(index)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
