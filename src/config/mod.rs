//! Configuration management for ragnar
//!
//! Loading, validation, and defaults for the retrieval core. The chunking,
//! embedding, and sparse-scoring sections are recorded in every generation
//! manifest; changing them requires a rebuild (`ragnar reindex`).

use crate::error::{RagnarError, Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub sparse: SparseConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the corpus database, blobs, and generation indexes
    pub data_dir: PathBuf,
    /// Raw document blobs at or above this size are zstd-compressed
    pub compression_threshold: usize,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target passage length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive passages (must be < chunk_size)
    pub chunk_overlap: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Expected embedding dimension (384 for MiniLM)
    pub dimension: usize,
    /// Passages embedded per gateway call during a build
    pub batch_size: usize,
}

/// BM25 scoring constants for the sparse index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseConfig {
    pub k1: f32,
    pub b: f32,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of passages returned by a query
    pub top_k: usize,
    /// Each index is asked for top_k * candidate_multiplier candidates
    pub candidate_multiplier: usize,
    /// Dense weight in [0,1]; sparse weight is 1 - alpha
    pub alpha: f32,
    /// Added to min-max denominators to avoid division by zero
    pub epsilon: f32,
}

/// Answer generation configuration
///
/// The generation step is an external collaborator: when enabled, the
/// assembled prompt is piped to `command` on stdin and the answer is read
/// from its stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagnarError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to read config file: {}", path.display()),
        })?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagnarError::Io {
            source: e,
            context: format!("Failed to write config file: {}", path.display()),
        })
    }

    /// Default config file location (~/.config/ragnar/config.toml)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagnarError::Config("Cannot determine config directory".to_string()))?;
        Ok(config_dir.join("ragnar").join("config.toml"))
    }

    /// Validate configuration values, collecting all failures
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "must be greater than zero",
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                format!(
                    "must be less than chunk_size ({} >= {})",
                    self.chunking.chunk_overlap, self.chunking.chunk_size
                ),
            ));
        }
        if self.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "must be greater than zero",
            ));
        }
        if self.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "must be greater than zero",
            ));
        }
        if self.sparse.k1 <= 0.0 {
            errors.push(ValidationError::new("sparse.k1", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.sparse.b) {
            errors.push(ValidationError::new("sparse.b", "must be within [0, 1]"));
        }
        if self.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "must be greater than zero",
            ));
        }
        if self.retrieval.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_multiplier",
                "must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.alpha) {
            errors.push(ValidationError::new(
                "retrieval.alpha",
                "must be within [0, 1]",
            ));
        }
        if self.retrieval.epsilon <= 0.0 {
            errors.push(ValidationError::new("retrieval.epsilon", "must be positive"));
        }
        if self.llm.enabled && self.llm.command.is_empty() {
            errors.push(ValidationError::new(
                "llm.command",
                "must be set when llm.enabled is true",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagnarError::ConfigValidation { errors })
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ragnar");

        Self {
            meta: MetaConfig {
                schema_version: "1".to_string(),
            },
            storage: StorageConfig {
                data_dir,
                compression_threshold: 4096,
            },
            chunking: ChunkingConfig {
                chunk_size: 500,
                chunk_overlap: 100,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
            },
            sparse: SparseConfig { k1: 1.5, b: 0.75 },
            retrieval: RetrievalConfig {
                top_k: 10,
                candidate_multiplier: 4,
                alpha: 0.5,
                epsilon: 1e-9,
            },
            llm: LlmConfig {
                enabled: false,
                command: String::new(),
                args: Vec::new(),
            },
        }
    }
}
