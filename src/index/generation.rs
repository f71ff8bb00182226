//! Corpus generation arena and atomic publication
//!
//! A `Generation` owns the complete passage sequence of one ingestion run
//! together with both indexes built from it, so the id join between dense
//! and sparse results holds by construction. `GenerationHandle` publishes a
//! finished generation with a single pointer swap: readers see either the
//! fully-previous snapshot or the fully-new one, never a half-built state,
//! and a retired generation is freed when its last reader drops the Arc.

use crate::corpus::Passage;
use crate::error::{RagnarError, Result};
use crate::index::{DenseIndex, GenerationManifest, SparseIndex};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// One immutable, fully-built corpus snapshot
#[derive(Debug)]
pub struct Generation {
    pub manifest: GenerationManifest,
    passages: Vec<Passage>,
    pub dense: DenseIndex,
    pub sparse: SparseIndex,
}

impl Generation {
    /// Assemble a generation, verifying that every part belongs to the same
    /// ingestion run and matches the manifest.
    pub fn new(
        manifest: GenerationManifest,
        passages: Vec<Passage>,
        dense: DenseIndex,
        sparse: SparseIndex,
    ) -> Result<Self> {
        if dense.generation() != sparse.generation() {
            return Err(RagnarError::GenerationMismatch {
                dense: dense.generation(),
                sparse: sparse.generation(),
            });
        }
        if dense.generation() != manifest.generation {
            return Err(RagnarError::GenerationMismatch {
                dense: dense.generation(),
                sparse: manifest.generation,
            });
        }

        manifest.check_passages(&passages)?;

        if dense.len() != passages.len() || sparse.len() != passages.len() {
            return Err(RagnarError::CorruptIndex(format!(
                "index sizes diverge from passage count: dense {}, sparse {}, passages {}",
                dense.len(),
                sparse.len(),
                passages.len()
            )));
        }
        if !passages.windows(2).all(|w| w[0].id < w[1].id) {
            return Err(RagnarError::CorruptIndex(
                "passages are not in ascending id order".to_string(),
            ));
        }

        Ok(Self {
            manifest,
            passages,
            dense,
            sparse,
        })
    }

    pub fn id(&self) -> Uuid {
        self.manifest.generation
    }

    pub fn passage(&self, id: u64) -> Option<&Passage> {
        self.passages
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &self.passages[i])
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Shared handle to the currently published generation
#[derive(Default)]
pub struct GenerationHandle {
    current: RwLock<Option<Arc<Generation>>>,
}

impl GenerationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the published generation. The lock is held only for the
    /// clone; callers keep the Arc across any embedding I/O.
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.current.read().unwrap().clone()
    }

    /// Swap in a finished generation, returning the retired one (kept alive
    /// by in-flight readers until they drop their Arcs).
    pub fn publish(&self, generation: Arc<Generation>) -> Option<Arc<Generation>> {
        let mut slot = self.current.write().unwrap();
        slot.replace(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::{EmbeddingError, EmbeddingProvider};
    use crate::index::DistanceMetric;

    struct FlatEmbedder;

    impl EmbeddingProvider for FlatEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "flat-test"
        }
    }

    fn passage(id: u64, text: &str) -> Passage {
        Passage {
            id,
            document: "doc.txt".to_string(),
            page: None,
            position: id as u32,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn build_generation(gen: Uuid, passages: Vec<Passage>) -> Generation {
        let config = Config::default();
        let dense = DenseIndex::build(gen, &passages, &FlatEmbedder, 8, &|| false).unwrap();
        let sparse = SparseIndex::build(gen, &passages, 1.5, 0.75);
        let mut manifest =
            GenerationManifest::new(gen, &config, DistanceMetric::Cosine, &passages);
        // FlatEmbedder's dimension differs from the configured default
        manifest.dimension = 2;
        Generation::new(manifest, passages, dense, sparse).unwrap()
    }

    #[test]
    fn mismatched_generations_are_rejected() {
        let config = Config::default();
        let passages = vec![passage(0, "text")];

        let gen_a = Uuid::new_v4();
        let gen_b = Uuid::new_v4();
        let dense = DenseIndex::build(gen_a, &passages, &FlatEmbedder, 8, &|| false).unwrap();
        let sparse = SparseIndex::build(gen_b, &passages, 1.5, 0.75);
        let manifest =
            GenerationManifest::new(gen_a, &config, DistanceMetric::Cosine, &passages);

        let err = Generation::new(manifest, passages, dense, sparse).unwrap_err();
        assert!(matches!(err, RagnarError::GenerationMismatch { .. }));
    }

    #[test]
    fn publish_swaps_and_returns_retired() {
        let handle = GenerationHandle::new();
        assert!(handle.current().is_none());

        let gen1 = Arc::new(build_generation(Uuid::new_v4(), vec![passage(0, "one")]));
        assert!(handle.publish(gen1.clone()).is_none());
        assert_eq!(handle.current().unwrap().id(), gen1.id());

        let gen2 = Arc::new(build_generation(Uuid::new_v4(), vec![passage(0, "two")]));
        let retired = handle.publish(gen2.clone()).unwrap();
        assert_eq!(retired.id(), gen1.id());
        assert_eq!(handle.current().unwrap().id(), gen2.id());
    }

    #[test]
    fn readers_keep_retired_generation_alive() {
        let handle = GenerationHandle::new();

        let gen1 = Arc::new(build_generation(Uuid::new_v4(), vec![passage(0, "old data")]));
        handle.publish(gen1);

        // An in-flight reader snapshots the current generation
        let reader_snapshot = handle.current().unwrap();
        let old_id = reader_snapshot.id();

        let gen2 = Arc::new(build_generation(Uuid::new_v4(), vec![passage(0, "new data")]));
        drop(handle.publish(gen2));

        // The reader still sees its own complete snapshot
        assert_eq!(reader_snapshot.id(), old_id);
        assert_eq!(reader_snapshot.passage(0).unwrap().text, "old data");
        // New readers see the new generation
        assert_ne!(handle.current().unwrap().id(), old_id);
    }

    #[test]
    fn passage_lookup_by_id() {
        let generation = build_generation(
            Uuid::new_v4(),
            vec![passage(0, "zero"), passage(1, "one"), passage(2, "two")],
        );
        assert_eq!(generation.passage(1).unwrap().text, "one");
        assert!(generation.passage(99).is_none());
    }
}
