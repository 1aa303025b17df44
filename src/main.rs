use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use tracing::info;
use triagerag::config::AppConfig;
use triagerag::embeddings::EmbeddingService;
use triagerag::store::InMemoryTriageStore;
use triagerag::TriageService;

#[derive(Parser)]
#[command(name = "triagerag")]
#[command(about = "Manchester-protocol symptom triage with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: config.toml, then config.example.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the local hashing embedder and the keyword mock backend
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage a symptoms description and print the outcome as JSON
    Triage {
        /// Free-text symptoms description
        symptoms: String,
    },
    /// Embed a text and print a preview of the vector
    Embed {
        text: String,
    },
    /// Cosine similarity between two texts
    Similarity {
        first: String,
        second: String,
    },
    /// Embedding cache commands
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Show availability of the embedding model, index and generation service
    Status,
    /// Load and validate the configuration
    CheckConfig,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove every cached embedding
    Clear,
    /// Show cache size and location
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(cli.config.as_ref());

    // Initialize logging: --verbose, then [logging] level, then RUST_LOG
    if cli.verbose {
        triagerag::logging::init_logging_with_level("debug")?;
    } else {
        triagerag::logging::init_logging_with_config(loaded.as_ref().ok())?;
    }

    if matches!(cli.command, Commands::CheckConfig) {
        return handle_check_config(loaded);
    }

    let mut config = loaded?;
    if cli.offline {
        config.embeddings.provider = "hashing".to_string();
        config.llm.provider = "mock".to_string();
    }
    info!("Configuration loaded successfully");

    match cli.command {
        Commands::Triage { symptoms } => handle_triage(&config, &symptoms).await?,
        Commands::Embed { text } => handle_embed(&config, &text).await?,
        Commands::Similarity { first, second } => {
            handle_similarity(&config, &first, &second).await?;
        }
        Commands::Cache(CacheCommands::Clear) => {
            let service = EmbeddingService::new(&config)?;
            let before = service.cache_len();
            service.clear_cache().await?;
            println!("🧹 Cleared {before} cached embedding(s)");
        }
        Commands::Cache(CacheCommands::Stats) => {
            let service = EmbeddingService::new(&config)?;
            let stats = service.cache_stats();
            println!("📦 Embedding cache:");
            println!("  Location: {}", service.cache_path().display());
            println!("  Entries: {}", stats.entries);
            println!("  Model: {}", service.model_name());
            println!("  Dimension: {}", service.dimension());
        }
        Commands::Status => handle_status(&config).await?,
        Commands::CheckConfig => {}
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => AppConfig::load().context("failed to load configuration"),
    }
}

async fn handle_triage(config: &AppConfig, symptoms: &str) -> anyhow::Result<()> {
    let store = Arc::new(InMemoryTriageStore::new());
    let service = TriageService::new(config, store)?;

    let outcome = service.triage(symptoms).await?;
    service.embedding_service().flush().await?;

    // stdout carries only the JSON outcome
    eprintln!(
        "{}",
        service
            .context_assembler()
            .create_summary(&outcome.similar_cases)
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn handle_embed(config: &AppConfig, text: &str) -> anyhow::Result<()> {
    let service = EmbeddingService::new(config)?;
    let embedding = service.embed(text).await?;
    service.flush().await?;

    let preview: Vec<String> = embedding.iter().take(8).map(|v| format!("{v:.4}")).collect();
    println!("🧠 {} dimensions", embedding.len());
    println!("  [{}, ...]", preview.join(", "));
    Ok(())
}

async fn handle_similarity(config: &AppConfig, first: &str, second: &str) -> anyhow::Result<()> {
    let service = EmbeddingService::new(config)?;
    let score = service.compute_similarity(first, second).await?;
    service.flush().await?;

    println!("🔗 Similarity: {score:.4}");
    Ok(())
}

async fn handle_status(config: &AppConfig) -> anyhow::Result<()> {
    let service = TriageService::new(config, Arc::new(InMemoryTriageStore::new()))?;
    let status = service.status().await;

    let mark = |ok: bool| if ok { "✅" } else { "❌" };
    println!("📊 triagerag status");
    println!(
        "  {} Embedding model loaded: {}",
        mark(status.embedding_model_loaded),
        config.embedding_model()
    );
    println!("  Cached embeddings: {}", status.cached_embeddings);
    match status.indexed_cases {
        Some(count) => println!("  ✅ Vector index: {count} case(s)"),
        None => println!("  ❌ Vector index unavailable"),
    }
    println!(
        "  {} Generation service: {} ({})",
        mark(status.generation_available),
        config.llm_model(),
        config.llm_endpoint()
    );
    Ok(())
}

fn handle_check_config(loaded: anyhow::Result<AppConfig>) -> anyhow::Result<()> {
    println!("🔍 Checking configuration...");

    match loaded {
        Ok(config) => {
            println!("✅ Configuration loaded successfully!");
            println!("📋 Configuration details:");
            println!("  Log level: {}", config.logging.level);
            println!("  Backtrace: {}", config.logging.backtrace);
            println!("  Embedding provider: {}", config.embeddings.provider);
            println!("  Embedding model: {}", config.embedding_model());
            println!("  Embedding endpoint: {}", config.embeddings.endpoint);
            println!("  Embedding dimension: {}", config.embedding_dimension());
            println!("  Cache directory: {}", config.embedding_cache_dir().display());
            println!("  Retrieval top-k: {}", config.retrieval_top_k());
            println!("  LLM provider: {}", config.llm.provider);
            println!("  LLM model: {}", config.llm_model());
            println!("  LLM endpoint: {}", config.llm_endpoint());
            println!(
                "  LLM retries: {} (timeout {}s, backoff base {}ms)",
                config.llm.max_retries, config.llm.timeout_secs, config.llm.backoff_base_ms
            );
            println!("\n🎉 Configuration check completed successfully!");
            Ok(())
        }
        Err(e) => {
            println!("❌ Configuration error: {e:#}");
            println!("\n💡 To fix this:");
            println!("  1. Copy config.example.toml to config.toml");
            println!("  2. Edit config.toml with your Ollama endpoints and models");
            println!("  3. Run this check again");
            Err(e)
        }
    }
}
