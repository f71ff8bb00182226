//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragnar",
    version,
    author = "neur0map",
    about = "Document question answering with hybrid dense + lexical retrieval",
    long_about = "Ragnar ingests extracted document text, chunks it into overlapping passages, \
                  indexes them both densely (vector similarity) and sparsely (BM25), and answers \
                  questions from the fused top passages with page-level citations."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragnar/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest an extracted text file and rebuild the corpus indexes
    Ingest {
        /// Path to the extracted document text (form feeds separate pages)
        file: PathBuf,

        /// Document name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Retrieve the most relevant passages for a query
    Search {
        /// Query text
        query: String,

        /// Maximum number of passages to return
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Dense weight in [0,1]; sparse weight is 1 - alpha
        #[arg(long)]
        alpha: Option<f32>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Ask a question against the ingested corpus
    Ask {
        /// Question to ask
        question: String,

        /// Number of context passages to retrieve
        #[arg(short = 'k', long)]
        limit: Option<usize>,

        /// Dense weight in [0,1]; sparse weight is 1 - alpha
        #[arg(long)]
        alpha: Option<f32>,

        /// Show the answer and sources in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Rebuild all indexes from stored documents (after config changes)
    Reindex,

    /// Show corpus and index status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
