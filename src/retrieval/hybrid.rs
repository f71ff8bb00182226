//! Hybrid retrieval combining dense and sparse search
//!
//! Queries both indexes of the published generation, aligns results by
//! passage id, fuses normalized scores, and hydrates the top-k passages.
//!
//! Candidate policy: the dense index contributes its top N and the sparse
//! index scores the full corpus and contributes its own top N, where
//! N = k * candidate_multiplier. The fused candidate set is the union;
//! passages outside the dense top-N fuse with dense similarity 0.

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagnarError, Result};
use crate::index::{Generation, GenerationHandle, Tokenizer};
use crate::retrieval::fusion::{fuse, Candidate, FusionConfig};
use crate::retrieval::RetrievedPassage;
use ahash::AHashMap;
use std::sync::Arc;

/// Hybrid retriever over the published corpus generation
pub struct HybridRetriever {
    provider: Arc<dyn EmbeddingProvider>,
    handle: Arc<GenerationHandle>,
    config: RetrievalConfig,
    tokenizer: Tokenizer,
}

impl HybridRetriever {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        handle: Arc<GenerationHandle>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            handle,
            config,
            tokenizer: Tokenizer::new(),
        }
    }

    /// Retrieve the top-k passages for a question.
    ///
    /// `alpha` weights the dense contribution (1.0 = dense only, 0.0 =
    /// sparse only). Fails with `EmptyIndex` before any generation is
    /// published; a question matching nothing still succeeds with whatever
    /// the fused ranking yields.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        alpha: f32,
    ) -> Result<Vec<RetrievedPassage>> {
        if question.trim().is_empty() {
            return Err(RagnarError::InvalidQuery(
                "question text cannot be empty".to_string(),
            ));
        }
        if k == 0 {
            return Err(RagnarError::InvalidQuery("k must be positive".to_string()));
        }

        let fusion_config = FusionConfig::new(alpha, self.config.epsilon)
            .map_err(|e| RagnarError::InvalidQuery(e.to_string()))?;

        // Snapshot the published generation; the Arc keeps it alive for the
        // whole query even if a rebuild publishes meanwhile. No lock is held
        // past this point, in particular not across the embedding call.
        let generation = self.handle.current().ok_or(RagnarError::EmptyIndex)?;
        if generation.is_empty() {
            return Err(RagnarError::EmptyIndex);
        }

        // Both indexes must come from the same ingestion run or the id join
        // would silently misalign.
        if generation.dense.generation() != generation.sparse.generation() {
            return Err(RagnarError::GenerationMismatch {
                dense: generation.dense.generation(),
                sparse: generation.sparse.generation(),
            });
        }

        let n = k.saturating_mul(self.config.candidate_multiplier).max(k);

        let query_vector = self.provider.embed(question)?;
        let query_tokens = self.tokenizer.tokenize(question);

        // Dense and sparse queries are independent reads of the snapshot
        let dense_task = {
            let generation = generation.clone();
            let query_vector = query_vector.clone();
            tokio::task::spawn_blocking(move || generation.dense.search(&query_vector, n))
        };
        let sparse_task = {
            let generation = generation.clone();
            tokio::task::spawn_blocking(move || generation.sparse.score(&query_tokens))
        };

        let (dense_results, sparse_scores) = tokio::join!(dense_task, sparse_task);
        let dense_results = dense_results
            .map_err(|e| RagnarError::Other(anyhow::anyhow!("dense search task failed: {e}")))?
            .map_err(|e| RagnarError::Other(anyhow::anyhow!("dense search failed: {e}")))?;
        let sparse_scores = sparse_scores
            .map_err(|e| RagnarError::Other(anyhow::anyhow!("sparse scoring task failed: {e}")))?;

        let candidates = assemble_candidates(&dense_results, &sparse_scores, n);
        let fused = fuse(&candidates, &fusion_config);

        let mut results = Vec::with_capacity(k.min(fused.len()));
        for &(id, score) in fused.iter().take(k) {
            let passage = generation.passage(id).ok_or_else(|| {
                RagnarError::CorruptIndex(format!("fused id {} missing from passage arena", id))
            })?;
            results.push(RetrievedPassage {
                id,
                text: passage.text.clone(),
                document: passage.document.clone(),
                page: passage.page,
                score,
            });
        }

        Ok(results)
    }

    /// Generation currently serving queries, if any
    pub fn current_generation(&self) -> Option<Arc<Generation>> {
        self.handle.current()
    }
}

/// Union of the dense top-N and the sparse top-N by (score desc, id asc)
fn assemble_candidates(
    dense_results: &[(u64, f32)],
    sparse_scores: &AHashMap<u64, f32>,
    n: usize,
) -> Vec<Candidate> {
    let mut sparse_top: Vec<(u64, f32)> = sparse_scores.iter().map(|(&id, &s)| (id, s)).collect();
    sparse_top.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    sparse_top.truncate(n);

    let dense_lookup: AHashMap<u64, f32> = dense_results.iter().copied().collect();

    let mut candidates: Vec<Candidate> = dense_results
        .iter()
        .map(|&(id, distance)| Candidate {
            id,
            dense_distance: Some(distance),
            sparse_score: sparse_scores.get(&id).copied().unwrap_or(0.0),
        })
        .collect();

    for (id, score) in sparse_top {
        if !dense_lookup.contains_key(&id) {
            candidates.push(Candidate {
                id,
                dense_distance: None,
                sparse_score: score,
            });
        }
    }

    candidates
}
