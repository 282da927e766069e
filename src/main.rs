//! # Vectors Connector CLI (`vcx`)
//!
//! Every command prints machine-readable JSON on stdout; logs go to stderr
//! (`RUST_LOG`, default `warn`).
//!
//! ## Usage
//!
//! ```bash
//! vcx --config ./config/vcx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vcx sources <store>` | List the source documents behind a store's segments |
//! | `vcx query <store> "<question>"` | Similarity search |
//! | `vcx add text\|file\|folder <store> ...` | Ingest content |
//! | `vcx remove <store> --source-id <id>` | Delete a source (or `--ids a,b`) |
//! | `vcx embed "<text>"` | Embed a text (or `--image <path>`) |
//! | `vcx health` | Probe the store and embedding service |
//! | `vcx completions <shell>` | Print shell completions |

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use vectors_connector::config::{self, Config};
use vectors_connector::core::embedding::EmbeddingProvider;
use vectors_connector::core::store::VectorStore;
use vectors_connector::embedding::create_provider;
use vectors_connector::ingest::{Ingestor, TextSource};
use vectors_connector::query::{embed_input, query_store, EmbedInput};
use vectors_connector::store::create_store;
use vectors_connector::{health, sources};

/// Vectors Connector CLI: ingest, query and list sources across vector
/// store backends.
///
/// All commands except `completions` read a TOML configuration file naming
/// the store backend and the embedding service.
#[derive(Parser)]
#[command(
    name = "vcx",
    about = "Vectors Connector: ingest, query and list sources across vector store backends",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vcx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the source documents stored in a store.
    ///
    /// Pages through every segment and folds them into one record per
    /// source. If a page fails the partial result is still printed and the
    /// command exits non-zero.
    Sources {
        /// Store (index, collection or table) name.
        store: String,
    },

    /// Answer a question with the most similar stored segments.
    Query {
        store: String,
        question: String,

        /// Maximum number of segments to return. Defaults to `[query].max_results`.
        #[arg(long)]
        max_results: Option<usize>,

        /// Minimum similarity score in [0, 1]. Defaults to `[query].min_score`.
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Add content to a store.
    Add {
        #[command(subcommand)]
        action: AddAction,
    },

    /// Remove segments from a store.
    Remove {
        store: String,

        /// Remove every segment of this source.
        #[arg(long, conflicts_with = "ids")]
        source_id: Option<String>,

        /// Remove these segment ids (comma separated).
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
    },

    /// Embed a text or an image with the configured service.
    Embed {
        /// Text to embed.
        #[arg(required_unless_present = "image")]
        text: Option<String>,

        /// Image file to embed instead of text.
        #[arg(long, conflicts_with = "text")]
        image: Option<PathBuf>,
    },

    /// Check that the store and the embedding service are reachable.
    Health,

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum AddAction {
    /// Add raw text as one source.
    Text {
        store: String,
        text: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Add one file (text, Markdown, PDF or DOCX).
    File { store: String, path: PathBuf },
    /// Add every matching file under a folder.
    Folder { store: String, path: PathBuf },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_store(cfg: &Config) -> Result<Box<dyn VectorStore>> {
    let mut store = create_store(&cfg.store)?;
    store
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {} store", cfg.store.backend))?;
    Ok(store)
}

async fn open_provider(cfg: &Config) -> Result<Box<dyn EmbeddingProvider>> {
    let mut provider = create_provider(&cfg.embedding)?;
    provider.connect().await.with_context(|| {
        format!("Failed to connect to {} embedding service", cfg.embedding.service)
    })?;
    Ok(provider)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "vcx", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sources { store: store_name } => {
            let mut store = open_store(&cfg).await?;
            let outcome =
                sources::list_sources(store.as_ref(), &store_name, &cfg.store.reconcile_options())
                    .await;
            store.disconnect().await;
            let outcome = outcome?;
            print_json(&outcome.result)?;
            if let Some(failure) = outcome.failure {
                bail!("source listing is incomplete: {}", failure);
            }
        }
        Commands::Query {
            store: store_name,
            question,
            max_results,
            min_score,
        } => {
            let mut store = open_store(&cfg).await?;
            let mut provider = open_provider(&cfg).await?;
            let response = query_store(
                store.as_ref(),
                provider.as_ref(),
                &store_name,
                &question,
                max_results.unwrap_or(cfg.query.max_results),
                min_score.unwrap_or(cfg.query.min_score),
            )
            .await;
            provider.disconnect().await;
            store.disconnect().await;
            print_json(&response?)?;
        }
        Commands::Add { action } => {
            let mut store = open_store(&cfg).await?;
            let mut provider = open_provider(&cfg).await?;
            let ingestor = Ingestor::new(store.as_ref(), provider.as_ref(), &cfg);
            let printed = match action {
                AddAction::Text {
                    store: store_name,
                    text,
                    title,
                    url,
                } => {
                    let source = TextSource { title, url };
                    ingestor
                        .add_text(&store_name, &text, &source)
                        .await
                        .and_then(|result| print_json(&result))
                }
                AddAction::File {
                    store: store_name,
                    path,
                } => ingestor
                    .add_file(&store_name, &path)
                    .await
                    .and_then(|result| print_json(&result)),
                AddAction::Folder {
                    store: store_name,
                    path,
                } => ingestor
                    .add_folder(&store_name, &path)
                    .await
                    .and_then(|report| print_json(&report)),
            };
            provider.disconnect().await;
            store.disconnect().await;
            printed?;
        }
        Commands::Remove {
            store: store_name,
            source_id,
            ids,
        } => {
            let mut store = open_store(&cfg).await?;
            let report = sources::remove(store.as_ref(), &store_name, source_id, ids).await;
            store.disconnect().await;
            print_json(&report?)?;
        }
        Commands::Embed { text, image } => {
            let mut provider = open_provider(&cfg).await?;
            let response = match (&text, &image) {
                (_, Some(path)) => {
                    let bytes = std::fs::read(path)
                        .with_context(|| format!("Failed to read image: {}", path.display()))?;
                    embed_input(provider.as_ref(), EmbedInput::Image(&bytes)).await
                }
                (Some(text), None) => embed_input(provider.as_ref(), EmbedInput::Text(text)).await,
                (None, None) => Err(anyhow::anyhow!("pass a text or --image")),
            };
            provider.disconnect().await;
            print_json(&response?)?;
        }
        Commands::Health => {
            let mut store = create_store(&cfg.store)?;
            let mut provider = create_provider(&cfg.embedding)?;
            if let Err(e) = store.connect().await {
                warn!("Store connection failed: {}", e);
            }
            if let Err(e) = provider.connect().await {
                warn!("Embedding service connection failed: {}", e);
            }
            let report = health::check(store.as_ref(), provider.as_ref()).await;
            provider.disconnect().await;
            store.disconnect().await;
            print_json(&report)?;
            if !report.is_healthy() {
                bail!("health check failed");
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
