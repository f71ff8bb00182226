use ragnar::answer::{AnswerEngine, CommandGenerator};
use ragnar::cli::{Cli, Commands, ConfigAction};
use ragnar::config::Config;
use ragnar::corpus::{BlobStore, CorpusStore};
use ragnar::embedding::FastEmbedProvider;
use ragnar::error::{RagnarError, Result};
use ragnar::index::GenerationHandle;
use ragnar::ingest::IngestPipeline;
use ragnar::retrieval::HybridRetriever;
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Ingest { file, name } => cmd_ingest(cli.config, file, name),
        Commands::Search {
            query,
            limit,
            alpha,
            json,
        } => cmd_search(cli.config, &query, limit, alpha, json),
        Commands::Ask {
            question,
            limit,
            alpha,
            json,
        } => cmd_ask(cli.config, &question, limit, alpha, json),
        Commands::Reindex => cmd_reindex(cli.config),
        Commands::Status => cmd_status(cli.config),
        Commands::Config { action } => cmd_config(cli.config, action),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "ragnar=debug" } else { "ragnar=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Everything a command needs to touch the corpus
struct AppState {
    config: Config,
    pipeline: Arc<IngestPipeline>,
    retriever: HybridRetriever,
}

fn open_state(config_path: Option<PathBuf>) -> Result<AppState> {
    let config = load_config(config_path)?;

    let data_dir = config.storage.data_dir.clone();
    let store = Arc::new(CorpusStore::new(&data_dir.join("corpus.db"))?);
    let blobs = Arc::new(BlobStore::new(
        data_dir,
        config.storage.compression_threshold,
    )?);
    let provider = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    let handle = Arc::new(GenerationHandle::new());

    let pipeline = Arc::new(IngestPipeline::new(
        config.clone(),
        store,
        blobs,
        provider.clone(),
        handle.clone(),
    ));
    let retriever = HybridRetriever::new(provider, handle, config.retrieval.clone());

    Ok(AppState {
        config,
        pipeline,
        retriever,
    })
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| RagnarError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_ingest(config_path: Option<PathBuf>, file: PathBuf, name: Option<String>) -> Result<()> {
    let state = open_state(config_path)?;

    let raw = std::fs::read_to_string(&file).map_err(|e| RagnarError::Io {
        source: e,
        context: format!("Failed to read document file: {}", file.display()),
    })?;

    let name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string())
    });

    let rt = runtime()?;
    let report = rt.block_on(state.pipeline.ingest_document(&name, &raw))?;

    println!("✓ Ingested '{}'", name);
    println!("  Generation: {}", report.generation);
    println!(
        "  {} document(s), {} passage(s), {}ms",
        report.document_count, report.passage_count, report.duration_ms
    );

    Ok(())
}

fn cmd_search(
    config_path: Option<PathBuf>,
    query: &str,
    limit: Option<usize>,
    alpha: Option<f32>,
    json: bool,
) -> Result<()> {
    let state = open_state(config_path)?;
    if state.pipeline.load_active()?.is_none() {
        return Err(RagnarError::EmptyIndex);
    }

    let k = limit.unwrap_or(state.config.retrieval.top_k);
    let alpha = alpha.unwrap_or(state.config.retrieval.alpha);

    let rt = runtime()?;
    let results = rt.block_on(state.retriever.retrieve(query, k, alpha))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).map_err(|e| RagnarError::Json {
                source: e,
                context: "Failed to serialize results".to_string(),
            })?
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No passages found for '{}'", query);
        return Ok(());
    }

    println!("Top {} passage(s) for '{}':", results.len(), query);
    for (rank, passage) in results.iter().enumerate() {
        let page = passage
            .page
            .map(|p| format!(" p.{}", p))
            .unwrap_or_default();
        println!(
            "  {}. [{:.3}] {}{}: {}",
            rank + 1,
            passage.score,
            passage.document,
            page,
            passage.preview(100)
        );
    }

    Ok(())
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    limit: Option<usize>,
    alpha: Option<f32>,
    json: bool,
) -> Result<()> {
    let state = open_state(config_path)?;
    if state.pipeline.load_active()?.is_none() {
        return Err(RagnarError::EmptyIndex);
    }

    let k = limit.unwrap_or(state.config.retrieval.top_k);
    let alpha = alpha.unwrap_or(state.config.retrieval.alpha);
    let rt = runtime()?;

    if !state.config.llm.enabled {
        // Retrieval-only mode: show the context that would ground an answer
        let results = rt.block_on(state.retriever.retrieve(question, k, alpha))?;
        println!("No answer generator configured (llm.enabled = false).");
        println!("Showing retrieved context instead:\n");
        for passage in &results {
            let page = passage
                .page
                .map(|p| format!(" p.{}", p))
                .unwrap_or_default();
            println!("--- {}{} [{:.3}]", passage.document, page, passage.score);
            println!("{}\n", passage.text);
        }
        return Ok(());
    }

    let generator = CommandGenerator::new(
        state.config.llm.command.clone(),
        state.config.llm.args.clone(),
    );
    let engine = AnswerEngine::new(state.retriever, generator);
    let answer = rt.block_on(engine.ask(question, k, alpha))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&answer).map_err(|e| RagnarError::Json {
                source: e,
                context: "Failed to serialize answer".to_string(),
            })?
        );
        return Ok(());
    }

    println!("{}\n", answer.text);
    println!("Sources:");
    for source in &answer.sources {
        let page = source.page.map(|p| format!(" p.{}", p)).unwrap_or_default();
        println!("  - {}{}: {}", source.document, page, source.preview(80));
    }

    Ok(())
}

fn cmd_reindex(config_path: Option<PathBuf>) -> Result<()> {
    let state = open_state(config_path)?;

    let rt = runtime()?;
    let report = rt.block_on(state.pipeline.rebuild())?;

    println!("✓ Rebuilt corpus indexes");
    println!("  Generation: {}", report.generation);
    println!(
        "  {} document(s), {} passage(s), {}ms",
        report.document_count, report.passage_count, report.duration_ms
    );

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let state = open_state(config_path)?;

    println!("Ragnar Status");
    println!("=============");

    let store = CorpusStore::new(&state.config.storage.data_dir.join("corpus.db"))?;
    let stats = store.stats()?;
    println!("\nDocuments:   {}", stats.document_count);
    println!("Generations: {}", stats.generation_count);

    let loaded = state.pipeline.load_active()?;
    match loaded.and_then(|_| state.retriever.current_generation()) {
        Some(generation) => {
            let manifest = &generation.manifest;
            println!("\nActive generation: {}", manifest.generation);
            println!(
                "  Created:   {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "  Embedding: {} ({}D, {})",
                manifest.embedding_model, manifest.dimension, manifest.metric
            );
            println!(
                "  Chunking:  {} chars, {} overlap",
                manifest.chunk_size, manifest.chunk_overlap
            );
            println!("  Passages:  {}", manifest.passage_count);
        }
        None => println!("\nNo corpus ingested yet. Run 'ragnar ingest <file>' first."),
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| RagnarError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RagnarError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'ragnar config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}
