//! Shared test fixtures: deterministic embedders and corpus setup
#![allow(dead_code)]

use ragnar::config::Config;
use ragnar::corpus::{BlobStore, CorpusStore};
use ragnar::embedding::{EmbeddingError, EmbeddingProvider};
use ragnar::index::GenerationHandle;
use ragnar::ingest::IngestPipeline;
use ragnar::retrieval::HybridRetriever;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const MOCK_DIMENSION: usize = 16;

/// Deterministic bag-of-words embedder: every token hashes to one of 16
/// buckets, so texts sharing words land near each other in cosine space.
/// No model download, identical vectors on every run.
pub struct MockEmbedder;

impl MockEmbedder {
    fn token_bucket(token: &str) -> usize {
        // FNV-1a, stable across platforms and releases
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % MOCK_DIMENSION as u64) as usize
    }
}

impl EmbeddingProvider for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0; MOCK_DIMENSION];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[Self::token_bucket(token)] += 1.0;
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn model_name(&self) -> &str {
        "mock-bag-of-words"
    }
}

/// Fails every call; exercises whole-build abort paths
pub struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::GenerationError("gateway down".to_string()))
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::GenerationError("gateway down".to_string()))
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn model_name(&self) -> &str {
        "mock-failing"
    }
}

/// Blocks the first embed_batch call until released, so a test can overlap
/// two builds deterministically.
pub struct GateEmbedder {
    inner: MockEmbedder,
    first_taken: AtomicBool,
    pub started: Arc<AtomicBool>,
    pub release: Arc<AtomicBool>,
}

impl GateEmbedder {
    pub fn new() -> Self {
        Self {
            inner: MockEmbedder,
            first_taken: AtomicBool::new(false),
            started: Arc::new(AtomicBool::new(false)),
            release: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EmbeddingProvider for GateEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if !self.first_taken.swap(true, Ordering::SeqCst) {
            self.started.store(true, Ordering::SeqCst);
            while !self.release.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
        }
        self.inner.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn model_name(&self) -> &str {
        "mock-gated"
    }
}

/// Config pointed at a temp dir, tuned for the mock embedder
pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.embedding.model = "mock-bag-of-words".to_string();
    config.embedding.dimension = MOCK_DIMENSION;
    config.embedding.batch_size = 2;
    config
}

/// Pipeline + retriever sharing one generation handle, like the binary wires
pub fn build_stack(
    config: Config,
    provider: Arc<dyn EmbeddingProvider>,
) -> (Arc<IngestPipeline>, HybridRetriever) {
    let data_dir = config.storage.data_dir.clone();
    let store = Arc::new(CorpusStore::new(&data_dir.join("corpus.db")).unwrap());
    let blobs = Arc::new(BlobStore::new(data_dir, config.storage.compression_threshold).unwrap());
    let handle = Arc::new(GenerationHandle::new());

    let pipeline = Arc::new(IngestPipeline::new(
        config.clone(),
        store,
        blobs,
        provider.clone(),
        handle.clone(),
    ));
    let retriever = HybridRetriever::new(provider, handle, config.retrieval.clone());

    (pipeline, retriever)
}
