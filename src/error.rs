use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the ragnar retrieval core
#[derive(Error, Debug)]
pub enum RagnarError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// A document could not be ingested. Fatal to that document only;
    /// previously ingested documents are untouched.
    #[error("Ingestion failed for '{document}': {message}")]
    Ingestion { document: String, message: String },

    /// Embedding gateway failure. During a build this aborts the whole
    /// generation; at query time it surfaces as retrieval-unavailable.
    #[error("Embedding error: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingError),

    /// Query issued before any generation was built and published
    #[error("No corpus generation has been built yet")]
    EmptyIndex,

    /// Malformed retrieval query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Dense and sparse results come from different ingestion runs
    #[error("Index generation mismatch: dense {dense}, sparse {sparse}")]
    GenerationMismatch { dense: Uuid, sparse: Uuid },

    /// Persisted index state does not match the running configuration
    #[error("Incompatible index state: {0}")]
    IncompatibleIndex(String),

    /// Persisted index state failed verification on load
    #[error("Corrupt index state: {0}")]
    CorruptIndex(String),

    /// A build was superseded by a newer ingestion run
    #[error("Index build superseded by a newer ingestion")]
    BuildSuperseded,

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Answer generation collaborator errors
    #[error("Answer generation error: {0}")]
    Answer(String),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ragnar operations
pub type Result<T> = std::result::Result<T, RagnarError>;
