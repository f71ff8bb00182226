//! Per-generation manifest
//!
//! Records everything a loader needs to detect incompatible or corrupted
//! persisted state: embedding model and dimension, distance metric, chunk
//! geometry, passage count, and a checksum over the passage sequence. A
//! loader that finds a mismatch must reject the generation rather than
//! serve wrong results.

use crate::config::Config;
use crate::corpus::Passage;
use crate::error::{RagnarError, Result};
use crate::index::DistanceMetric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub generation: Uuid,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub passage_count: usize,
    pub checksum: String,
}

impl GenerationManifest {
    pub fn new(
        generation: Uuid,
        config: &Config,
        metric: DistanceMetric,
        passages: &[Passage],
    ) -> Self {
        Self {
            generation,
            created_at: Utc::now(),
            embedding_model: config.embedding.model.clone(),
            dimension: config.embedding.dimension,
            metric,
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            passage_count: passages.len(),
            checksum: passage_checksum(passages),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        let path = dir.join(MANIFEST_FILE);
        std::fs::write(&path, content).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to write manifest: {}", path.display()),
        })
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to read manifest: {}", path.display()),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Reject a generation built under a different configuration
    pub fn check_config(&self, config: &Config) -> Result<()> {
        if self.embedding_model != config.embedding.model {
            return Err(RagnarError::IncompatibleIndex(format!(
                "built with embedding model '{}', configured model is '{}'",
                self.embedding_model, config.embedding.model
            )));
        }
        if self.dimension != config.embedding.dimension {
            return Err(RagnarError::IncompatibleIndex(format!(
                "built with dimension {}, configured dimension is {}",
                self.dimension, config.embedding.dimension
            )));
        }
        if self.chunk_size != config.chunking.chunk_size
            || self.chunk_overlap != config.chunking.chunk_overlap
        {
            return Err(RagnarError::IncompatibleIndex(format!(
                "built with chunking {}/{}, configured chunking is {}/{}; run `ragnar reindex`",
                self.chunk_size,
                self.chunk_overlap,
                config.chunking.chunk_size,
                config.chunking.chunk_overlap
            )));
        }
        Ok(())
    }

    /// Verify the loaded passage sequence against recorded count + checksum
    pub fn check_passages(&self, passages: &[Passage]) -> Result<()> {
        if passages.len() != self.passage_count {
            return Err(RagnarError::CorruptIndex(format!(
                "manifest records {} passages, store has {}",
                self.passage_count,
                passages.len()
            )));
        }
        let checksum = passage_checksum(passages);
        if checksum != self.checksum {
            return Err(RagnarError::CorruptIndex(format!(
                "passage checksum mismatch: manifest {}, store {}",
                self.checksum, checksum
            )));
        }
        Ok(())
    }
}

/// Truncated BLAKE3 digest over the id-tagged passage sequence
pub fn passage_checksum(passages: &[Passage]) -> String {
    let mut hasher = blake3::Hasher::new();
    for passage in passages {
        hasher.update(&passage.id.to_le_bytes());
        hasher.update(passage.text.as_bytes());
    }
    format!("{:.32}", hasher.finalize().to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

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

    #[test]
    fn save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let passages = vec![passage(0, "first"), passage(1, "second")];

        let manifest =
            GenerationManifest::new(Uuid::new_v4(), &config, DistanceMetric::Cosine, &passages);
        manifest.save(temp.path()).unwrap();

        let loaded = GenerationManifest::load(temp.path()).unwrap();
        assert_eq!(loaded.generation, manifest.generation);
        assert_eq!(loaded.checksum, manifest.checksum);
        assert_eq!(loaded.passage_count, 2);
    }

    #[test]
    fn config_drift_is_rejected() {
        let config = Config::default();
        let manifest = GenerationManifest::new(
            Uuid::new_v4(),
            &config,
            DistanceMetric::Cosine,
            &[passage(0, "text")],
        );

        let mut changed = config.clone();
        changed.chunking.chunk_size = 200;
        assert!(matches!(
            manifest.check_config(&changed),
            Err(RagnarError::IncompatibleIndex(_))
        ));

        let mut changed = config.clone();
        changed.embedding.model = "bge-small-en-v1.5".to_string();
        assert!(manifest.check_config(&changed).is_err());

        assert!(manifest.check_config(&config).is_ok());
    }

    #[test]
    fn tampered_passages_are_rejected() {
        let config = Config::default();
        let passages = vec![passage(0, "original")];
        let manifest =
            GenerationManifest::new(Uuid::new_v4(), &config, DistanceMetric::Cosine, &passages);

        assert!(manifest.check_passages(&passages).is_ok());

        let tampered = vec![passage(0, "modified")];
        assert!(matches!(
            manifest.check_passages(&tampered),
            Err(RagnarError::CorruptIndex(_))
        ));

        let truncated: Vec<Passage> = Vec::new();
        assert!(manifest.check_passages(&truncated).is_err());
    }

    #[test]
    fn checksum_depends_on_ids_and_text() {
        let a = passage_checksum(&[passage(0, "text")]);
        let b = passage_checksum(&[passage(1, "text")]);
        let c = passage_checksum(&[passage(0, "other")]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
