//! Persistence round-trip and loader rejection tests
//!
//! A persisted generation must load back to bit-for-bit identical retrieval
//! results, and a loader must reject incompatible or corrupted state rather
//! than serve wrong answers.

mod common;

use common::{build_stack, test_config, MockEmbedder};
use ragnar::error::RagnarError;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn reload_reproduces_results_exactly() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let (pipeline, retriever) = build_stack(config.clone(), Arc::new(MockEmbedder));
    pipeline
        .ingest_document("a.txt", "the cat sat on the mat")
        .await
        .unwrap();
    pipeline
        .ingest_document("b.txt", "dogs bark loudly at night")
        .await
        .unwrap();
    pipeline
        .ingest_document("c.txt", "the mat was woven from reeds")
        .await
        .unwrap();

    let query = "cat on the mat";
    let before = retriever.retrieve(query, 3, 0.5).await.unwrap();

    // A fresh process: new handle, new pipeline, same on-disk state
    let (reloaded_pipeline, reloaded_retriever) =
        build_stack(config.clone(), Arc::new(MockEmbedder));
    let generation = reloaded_pipeline.load_active().unwrap();
    assert!(generation.is_some());

    let after = reloaded_retriever.retrieve(query, 3, 0.5).await.unwrap();

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.id, a.id);
        assert_eq!(b.score, a.score);
        assert_eq!(b.text, a.text);
        assert_eq!(b.document, a.document);
        assert_eq!(b.page, a.page);
    }
}

#[tokio::test]
async fn loader_rejects_changed_chunking_config() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let (pipeline, _) = build_stack(config.clone(), Arc::new(MockEmbedder));
    pipeline.ingest_document("a.txt", "some corpus text").await.unwrap();

    let mut changed = config.clone();
    changed.chunking.chunk_size = 123;
    changed.chunking.chunk_overlap = 7;

    let (stale_pipeline, _) = build_stack(changed, Arc::new(MockEmbedder));
    let err = stale_pipeline.load_active().unwrap_err();
    assert!(matches!(err, RagnarError::IncompatibleIndex(_)));
}

#[tokio::test]
async fn loader_rejects_changed_embedding_model() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let (pipeline, _) = build_stack(config.clone(), Arc::new(MockEmbedder));
    pipeline.ingest_document("a.txt", "some corpus text").await.unwrap();

    let mut changed = config.clone();
    changed.embedding.model = "a-different-model".to_string();

    let (stale_pipeline, _) = build_stack(changed, Arc::new(MockEmbedder));
    let err = stale_pipeline.load_active().unwrap_err();
    assert!(matches!(err, RagnarError::IncompatibleIndex(_)));
}

#[tokio::test]
async fn loader_rejects_tampered_passages() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let (pipeline, _) = build_stack(config.clone(), Arc::new(MockEmbedder));
    pipeline.ingest_document("a.txt", "original passage text").await.unwrap();

    // Flip one passage behind the manifest's back
    let db = rusqlite::Connection::open(config.storage.data_dir.join("corpus.db")).unwrap();
    db.execute("UPDATE passages SET text = 'tampered text'", []).unwrap();
    drop(db);

    let (stale_pipeline, _) = build_stack(config.clone(), Arc::new(MockEmbedder));
    let err = stale_pipeline.load_active().unwrap_err();
    assert!(matches!(err, RagnarError::CorruptIndex(_)));
}

#[tokio::test]
async fn loader_rejects_missing_index_file() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let (pipeline, retriever) = build_stack(config.clone(), Arc::new(MockEmbedder));
    pipeline.ingest_document("a.txt", "some corpus text").await.unwrap();

    let generation = retriever.current_generation().unwrap().id();
    let dense_file = config
        .storage
        .data_dir
        .join("generations")
        .join(generation.to_string())
        .join("dense.json");
    std::fs::remove_file(&dense_file).unwrap();

    let (stale_pipeline, _) = build_stack(config.clone(), Arc::new(MockEmbedder));
    assert!(stale_pipeline.load_active().is_err());
}

#[tokio::test]
async fn reindex_recovers_after_config_change() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let (pipeline, _) = build_stack(config.clone(), Arc::new(MockEmbedder));
    pipeline
        .ingest_document("a.txt", "a document long enough to span several chunks of text")
        .await
        .unwrap();

    let mut changed = config.clone();
    changed.chunking.chunk_size = 20;
    changed.chunking.chunk_overlap = 5;

    let (new_pipeline, new_retriever) = build_stack(changed, Arc::new(MockEmbedder));
    assert!(new_pipeline.load_active().is_err());

    // Rebuild re-chunks from the stored raw documents under the new config
    let report = new_pipeline.rebuild().await.unwrap();
    assert!(report.passage_count > 1);
    assert!(new_pipeline.load_active().is_ok());

    let results = new_retriever.retrieve("document chunks", 2, 0.5).await.unwrap();
    assert!(!results.is_empty());
}

#[tokio::test]
async fn retired_generations_are_pruned() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let (pipeline, retriever) = build_stack(config.clone(), Arc::new(MockEmbedder));
    pipeline.ingest_document("a.txt", "first version").await.unwrap();
    let first = retriever.current_generation().unwrap().id();

    pipeline.ingest_document("b.txt", "second version").await.unwrap();
    let second = retriever.current_generation().unwrap().id();
    assert_ne!(first, second);

    let generations_dir = config.storage.data_dir.join("generations");
    assert!(!generations_dir.join(first.to_string()).exists());
    assert!(generations_dir.join(second.to_string()).exists());
}
