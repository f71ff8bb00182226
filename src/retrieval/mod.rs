//! Hybrid retrieval
//!
//! Score fusion over the dense and sparse indexes of one published corpus
//! generation, returning ranked passages with citation metadata.

mod fusion;
mod hybrid;

pub use fusion::{fuse, Candidate, FusionConfig, FusionError};
pub use hybrid::HybridRetriever;

use serde::{Deserialize, Serialize};

/// A passage selected for a query, with its fused relevance score and the
/// citation metadata carried verbatim from ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Passage id within the generation that served this query
    pub id: u64,
    /// Passage text
    pub text: String,
    /// Source document name
    pub document: String,
    /// 1-based page of the passage's first character, when known
    pub page: Option<u32>,
    /// Fused relevance score in [0, 1], higher is more relevant
    pub score: f32,
}

impl RetrievedPassage {
    /// Short preview of the passage text (first `max_chars` characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            self.text.clone()
        } else {
            let cut: String = self.text.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}
