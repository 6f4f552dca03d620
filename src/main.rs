//! wikilite CLI application
//!
//! Command-line interface for the wikilite library.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wikilite::{api, create_embedder, ingest, Config, Retriever, Store};

#[derive(Parser)]
#[command(name = "wikilite")]
#[command(about = "Offline wiki search engine: SQLite FTS5 + quantized vector search")]
#[command(version)]
struct Cli {
    /// SQLite database path
    #[arg(long, default_value = "wikilite.db")]
    db: PathBuf,

    /// Content language code
    #[arg(long)]
    language: Option<String>,

    /// Maximum number of search results
    #[arg(long)]
    limit: Option<usize>,

    /// Enable embedding support
    #[arg(long)]
    ai: bool,

    /// Run the embedding model in-process instead of over HTTP
    #[arg(long)]
    ai_local: bool,

    /// Base URL of an OpenAI-compatible embeddings endpoint
    #[arg(long)]
    ai_url: Option<String>,

    /// API key for the embeddings endpoint
    #[arg(long)]
    ai_api_key: Option<String>,

    /// Embedding model identifier
    #[arg(long)]
    model: Option<String>,

    /// Prefix prepended to section text before ingest-time embedding
    #[arg(long)]
    model_prefix_save: Option<String>,

    /// Prefix prepended to queries before search-time embedding
    #[arg(long)]
    model_prefix_search: Option<String>,

    /// ANN quantization mode: binary or mrl
    #[arg(long)]
    ann_mode: Option<String>,

    /// MRL prefix length in components
    #[arg(long)]
    ann_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a JSONL HTML dump (optionally gzip-compressed)
    Import {
        /// Dump file path
        input: PathBuf,
    },

    /// Rebuild the full-text indexes and the vocabulary
    Index,

    /// Generate embeddings and build the ANN index
    Embeddings,

    /// Remove duplicate sections and compact the database
    Optimize,

    /// Deflate section text where it saves space
    Compress,

    /// Search once, or start the interactive prompt
    Search {
        /// One-shot query; omit for interactive mode
        query: Option<String>,
    },

    /// Serve the HTTP/JSON API
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Merge CLI flags over persisted setup values over built-in defaults.
fn build_config(cli: &Cli, store: &Store) -> Config {
    let defaults = Config::default();
    let settings = store.settings();

    let pick = |flag: &Option<String>, setup: &str, default: String| -> String {
        flag.clone()
            .or_else(|| (!setup.is_empty()).then(|| setup.to_string()))
            .unwrap_or(default)
    };

    Config {
        db: cli.db.clone(),
        language: pick(&cli.language, &settings.language, defaults.language),
        limit: cli.limit.unwrap_or(defaults.limit),
        ai: cli.ai,
        ai_local: cli.ai_local,
        ai_url: cli.ai_url.clone().unwrap_or(defaults.ai_url),
        ai_api_key: cli.ai_api_key.clone().unwrap_or(defaults.ai_api_key),
        model: pick(&cli.model, &settings.model, defaults.model),
        model_prefix_save: pick(
            &cli.model_prefix_save,
            &settings.model_prefix_save,
            defaults.model_prefix_save,
        ),
        model_prefix_search: pick(
            &cli.model_prefix_search,
            &settings.model_prefix_search,
            defaults.model_prefix_search,
        ),
        ann_mode: pick(&cli.ann_mode, &settings.ann_mode, defaults.ann_mode),
        ann_size: cli
            .ann_size
            .or((settings.ann_size > 0).then_some(settings.ann_size))
            .unwrap_or(defaults.ann_size),
        web_host: defaults.web_host,
        web_port: defaults.web_port,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut store = Store::open(&cli.db)?;
    let config = build_config(&cli, &store);

    match cli.command {
        Commands::Import { input } => {
            store.import_mode()?;
            store.setup_put("language", &config.language)?;
            let imported = ingest::import_dump(&mut store, &input)?;
            store.read_mode()?;
            println!("Imported {} articles", imported);
        }

        Commands::Index => {
            store.import_mode()?;
            store.process_titles()?;
            store.process_contents()?;
            store.process_vocabulary()?;
            store.read_mode()?;
            println!("Full-text indexes and vocabulary rebuilt");
        }

        Commands::Embeddings => {
            let embedder = create_embedder(&config)
                .await?
                .ok_or("embedding support disabled; pass --ai")?;

            let cancel = Arc::new(AtomicBool::new(false));
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        log::warn!("Interrupt received, stopping after the current batch");
                        cancel.store(true, Ordering::Relaxed);
                    }
                });
            }

            store.import_mode()?;
            ingest::process_embeddings(&mut store, embedder.as_ref(), &config, &cancel).await?;
            store.read_mode()?;
        }

        Commands::Optimize => {
            store.import_mode()?;
            store.optimize()?;
            store.read_mode()?;
            println!("Database optimized");
        }

        Commands::Compress => {
            store.import_mode()?;
            store.compress()?;
            store.read_mode()?;
            println!("Section text compressed");
        }

        Commands::Search { query } => {
            let embedder = create_embedder(&config).await?;
            match query {
                Some(query) => {
                    let retriever = Retriever::new(&store, embedder.as_deref());
                    let results = retriever.search(&query, config.limit).await?;
                    for (i, result) in results.iter().enumerate() {
                        println!(
                            "{:3} [{}] {} ({:.3})",
                            i + 1,
                            result.kind.code(),
                            result.title,
                            result.power
                        );
                    }
                }
                None => api::run_repl(&store, embedder.as_deref(), config.limit).await?,
            }
        }

        Commands::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.web_host = host;
            }
            if let Some(port) = port {
                config.web_port = port;
            }
            let embedder = create_embedder(&config).await?;
            api::run_server(&config, store, embedder).await?;
        }
    }

    Ok(())
}
