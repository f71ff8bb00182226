//! Ingestion pipeline
//!
//! Turns stored documents into a published corpus generation: chunk every
//! document into one id-tagged passage sequence, build the dense and sparse
//! indexes from that single sequence, persist generation state, then
//! publish with an atomic swap. A build either completes fully or leaves
//! the previously published generation serving queries; there is no partial
//! publish.

use crate::chunker::Chunker;
use crate::config::Config;
use crate::corpus::{BlobStore, CorpusStore, DocumentText, Passage};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagnarError, Result};
use crate::index::{
    DenseIndex, DenseIndexError, DistanceMetric, Generation, GenerationHandle, GenerationManifest,
    SparseIndex,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const DENSE_FILE: &str = "dense.json";
const SPARSE_FILE: &str = "sparse.json";

/// Outcome of a completed ingestion run
#[derive(Debug)]
pub struct IngestReport {
    pub generation: Uuid,
    pub document_count: usize,
    pub passage_count: usize,
    pub duration_ms: u64,
}

/// Ingestion pipeline over the corpus store and both indexes
pub struct IngestPipeline {
    config: Config,
    store: Arc<CorpusStore>,
    blobs: Arc<BlobStore>,
    provider: Arc<dyn EmbeddingProvider>,
    handle: Arc<GenerationHandle>,
    epoch: Arc<AtomicU64>,
}

impl IngestPipeline {
    pub fn new(
        config: Config,
        store: Arc<CorpusStore>,
        blobs: Arc<BlobStore>,
        provider: Arc<dyn EmbeddingProvider>,
        handle: Arc<GenerationHandle>,
    ) -> Self {
        Self {
            config,
            store,
            blobs,
            provider,
            handle,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add or replace one document, then rebuild and publish a new
    /// generation covering the whole corpus.
    ///
    /// Form feeds in `raw_text` mark page boundaries for citation metadata.
    pub async fn ingest_document(&self, name: &str, raw_text: &str) -> Result<IngestReport> {
        if name.trim().is_empty() {
            return Err(RagnarError::Ingestion {
                document: name.to_string(),
                message: "document name cannot be empty".to_string(),
            });
        }
        if raw_text.trim().is_empty() {
            return Err(RagnarError::Ingestion {
                document: name.to_string(),
                message: "extracted text is empty".to_string(),
            });
        }

        let (blob_hash, _) = self.blobs.write(raw_text.as_bytes())?;
        let has_pages = raw_text.contains(crate::corpus::PAGE_SEPARATOR);
        self.store.upsert_document(name, &blob_hash, has_pages)?;

        info!(document = name, blob = %blob_hash, "Document stored, rebuilding corpus");
        self.rebuild().await
    }

    /// Rebuild the generation from every stored document (after a chunking
    /// or embedding configuration change, or to recover index files).
    pub async fn rebuild(&self) -> Result<IngestReport> {
        let start = std::time::Instant::now();

        // Claim a build epoch; any later build supersedes this one and makes
        // it abort at the next embedding batch.
        let my_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        if self.provider.dimension() != self.config.embedding.dimension {
            return Err(RagnarError::IncompatibleIndex(format!(
                "embedding provider dimension {} does not match configured dimension {}",
                self.provider.dimension(),
                self.config.embedding.dimension
            )));
        }

        let chunker = Chunker::new(
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        )
        .map_err(|e| RagnarError::Config(e.to_string()))?;

        let documents = self.store.documents()?;
        let mut texts = Vec::with_capacity(documents.len());
        for record in &documents {
            let raw = self.blobs.read(&record.blob_hash)?;
            let raw = String::from_utf8(raw).map_err(|e| RagnarError::Ingestion {
                document: record.name.clone(),
                message: format!("stored text is not valid UTF-8: {}", e),
            })?;
            texts.push(DocumentText::from_raw(record.name.clone(), &raw));
        }

        let passages = chunk_documents(&chunker, &texts);
        let generation = Uuid::new_v4();

        info!(
            %generation,
            documents = documents.len(),
            passages = passages.len(),
            "Building corpus generation"
        );

        self.store.begin_generation(generation, documents.len())?;
        let passage_count = match self.build_and_publish(generation, passages, my_epoch).await {
            Ok(count) => count,
            Err(e) => {
                // Failed builds never publish; drop their store rows and files
                if let Err(cleanup) = self.store.delete_generation(generation) {
                    warn!(%generation, "Failed to clean up aborted generation: {}", cleanup);
                }
                let _ = std::fs::remove_dir_all(self.generation_dir(generation));
                return Err(e);
            }
        };

        let report = IngestReport {
            generation,
            document_count: documents.len(),
            passage_count,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            %generation,
            passages = report.passage_count,
            duration_ms = report.duration_ms,
            "Generation published"
        );

        Ok(report)
    }

    /// Spawn the rebuild on a background task
    pub fn rebuild_background(
        self: Arc<Self>,
    ) -> tokio::task::JoinHandle<Result<IngestReport>> {
        tokio::spawn(async move { self.rebuild().await })
    }

    async fn build_and_publish(
        &self,
        generation: Uuid,
        passages: Vec<Passage>,
        my_epoch: u64,
    ) -> Result<usize> {
        self.store.insert_passages(generation, &passages)?;

        // Dense (embedding-heavy) and sparse builds run on blocking threads;
        // queries continue against the previously published generation.
        let dense_task = {
            let provider = self.provider.clone();
            let passages = passages.clone();
            let batch_size = self.config.embedding.batch_size;
            let epoch = self.epoch.clone();
            tokio::task::spawn_blocking(move || {
                let should_abort = move || epoch.load(Ordering::SeqCst) != my_epoch;
                DenseIndex::build(generation, &passages, provider.as_ref(), batch_size, &should_abort)
            })
        };
        let sparse_task = {
            let passages = passages.clone();
            let k1 = self.config.sparse.k1;
            let b = self.config.sparse.b;
            tokio::task::spawn_blocking(move || SparseIndex::build(generation, &passages, k1, b))
        };

        let (dense, sparse) = tokio::join!(dense_task, sparse_task);
        let dense = dense
            .map_err(|e| RagnarError::Other(anyhow::anyhow!("dense build task failed: {e}")))?
            .map_err(map_dense_error)?;
        let sparse = sparse
            .map_err(|e| RagnarError::Other(anyhow::anyhow!("sparse build task failed: {e}")))?;

        let manifest =
            GenerationManifest::new(generation, &self.config, DistanceMetric::Cosine, &passages);

        let dir = self.generation_dir(generation);
        std::fs::create_dir_all(&dir).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to create generation directory: {}", dir.display()),
        })?;
        manifest.save(&dir)?;
        dense
            .persist(&dir.join(DENSE_FILE))
            .map_err(map_dense_error)?;
        sparse
            .persist(&dir.join(SPARSE_FILE))
            .map_err(|e| RagnarError::CorruptIndex(format!("sparse persist: {}", e)))?;

        let built = Generation::new(manifest, passages, dense, sparse)?;
        let passage_count = built.len();

        self.store.mark_active(generation)?;
        self.handle.publish(Arc::new(built));

        self.prune_retired();
        Ok(passage_count)
    }

    /// Load the active generation from disk and publish it.
    ///
    /// Verifies the manifest against the running configuration and the
    /// loaded data before anything can serve queries. Returns the published
    /// generation id, or None when nothing has been ingested yet.
    pub fn load_active(&self) -> Result<Option<Uuid>> {
        let Some(generation) = self.store.active_generation()? else {
            return Ok(None);
        };

        let dir = self.generation_dir(generation);
        let manifest = GenerationManifest::load(&dir)?;
        manifest.check_config(&self.config)?;

        if manifest.dimension != self.provider.dimension() {
            return Err(RagnarError::IncompatibleIndex(format!(
                "generation built with dimension {}, provider produces {}",
                manifest.dimension,
                self.provider.dimension()
            )));
        }

        let passages = self.store.passages(generation)?;
        let dense = DenseIndex::load(&dir.join(DENSE_FILE)).map_err(map_dense_error)?;
        let sparse = SparseIndex::load(&dir.join(SPARSE_FILE))
            .map_err(|e| RagnarError::CorruptIndex(format!("sparse index: {}", e)))?;

        let built = Generation::new(manifest, passages, dense, sparse)?;
        self.handle.publish(Arc::new(built));

        info!(%generation, "Loaded active generation");
        Ok(Some(generation))
    }

    /// Shared handle serving queries
    pub fn handle(&self) -> Arc<GenerationHandle> {
        self.handle.clone()
    }

    fn generation_dir(&self, generation: Uuid) -> PathBuf {
        self.config
            .storage
            .data_dir
            .join("generations")
            .join(generation.to_string())
    }

    fn prune_retired(&self) {
        match self.store.retired_generations() {
            Ok(retired) => {
                for generation in retired {
                    let _ = std::fs::remove_dir_all(self.generation_dir(generation));
                    if let Err(e) = self.store.delete_generation(generation) {
                        warn!(%generation, "Failed to prune retired generation: {}", e);
                    }
                }
            }
            Err(e) => warn!("Failed to list retired generations: {}", e),
        }
    }
}

fn map_dense_error(e: DenseIndexError) -> RagnarError {
    match e {
        DenseIndexError::Embedding(e) => RagnarError::Embedding(e),
        DenseIndexError::Superseded => RagnarError::BuildSuperseded,
        DenseIndexError::InvalidDimension { expected, actual } => RagnarError::IncompatibleIndex(
            format!("embedding dimension {actual} where index expects {expected}"),
        ),
        other => RagnarError::CorruptIndex(format!("dense index: {}", other)),
    }
}

/// Chunk every document into one passage sequence with generation-wide ids
fn chunk_documents(chunker: &Chunker, documents: &[DocumentText]) -> Vec<Passage> {
    let mut passages = Vec::new();
    let mut next_id: u64 = 0;

    for doc in documents {
        for (position, span) in chunker.chunks(&doc.text).enumerate() {
            let page = doc.pages.as_ref().map(|p| p.page_at(span.start));
            passages.push(Passage {
                id: next_id,
                document: doc.name.clone(),
                page,
                position: position as u32,
                start: span.start,
                end: span.end,
                text: span.text.to_string(),
            });
            next_id += 1;
        }
    }

    passages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_assigns_generation_wide_ids() {
        let chunker = Chunker::new(10, 3).unwrap();
        let docs = vec![
            DocumentText::from_raw("a.txt", "abcdefghijklmnopqrstuvwxy"),
            DocumentText::from_raw("b.txt", "short"),
        ];

        let passages = chunk_documents(&chunker, &docs);

        assert_eq!(passages.len(), 5);
        let ids: Vec<u64> = passages.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        // Position restarts per document; ids do not
        assert_eq!(passages[3].document, "a.txt");
        assert_eq!(passages[3].position, 3);
        assert_eq!(passages[4].document, "b.txt");
        assert_eq!(passages[4].position, 0);
    }

    #[test]
    fn chunking_attributes_pages() {
        let chunker = Chunker::new(8, 2).unwrap();
        let docs = vec![DocumentText::from_raw("p.pdf", "page one\x0cpage two")];

        let passages = chunk_documents(&chunker, &docs);
        assert_eq!(passages[0].page, Some(1));
        let last = passages.last().unwrap();
        assert_eq!(last.page, Some(2));
    }

    #[test]
    fn empty_corpus_chunks_to_nothing() {
        let chunker = Chunker::new(10, 3).unwrap();
        assert!(chunk_documents(&chunker, &[]).is_empty());
    }

    #[test]
    fn ingesting_same_text_twice_yields_identical_sequence() {
        let chunker = Chunker::new(10, 3).unwrap();
        let docs = vec![DocumentText::from_raw("a.txt", "abcdefghijklmnopqrstuvwxy")];

        let first = chunk_documents(&chunker, &docs);
        let second = chunk_documents(&chunker, &docs);
        assert_eq!(first, second);
    }
}
