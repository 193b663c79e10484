//! # docquery CLI (`dq`)
//!
//! The `dq` binary drives the full document question-answering flow:
//! database initialization, ingestion, asking questions, and managing
//! per-user conversation history.
//!
//! ## Usage
//!
//! ```bash
//! dq --config ./config/dq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dq init` | Create the SQLite database and vector index schema |
//! | `dq ingest <dir>` | Load, chunk, embed, and index documents |
//! | `dq ask "<question>"` | Answer a question from the indexed documents |
//! | `dq history <user>` | Show (or clear) a user's conversation history |
//! | `dq users` | List users with stored conversations |
//! | `dq stats` | Show index statistics |
//! | `dq clear-index` | Remove every indexed record |
//! | `dq delete-source <path>` | Remove records ingested from one file |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docquery::config::{self, Config};
use docquery::db;
use docquery::embedding::{create_embedder, Embedder};
use docquery::generation::create_generator;
use docquery::ingest::IngestionPipeline;
use docquery::memory::ConversationStore;
use docquery::query::QueryPipeline;
use docquery::store::VectorStore;

/// docquery — retrieval-augmented question answering over local documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dq.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dq",
    about = "docquery — retrieval-augmented question answering over local documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/dq.toml`. Database, embedding, generation,
    /// and memory settings are read from this file.
    #[arg(long, global = true, default_value = "./config/dq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the vector index tables.
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest documents from a directory.
    ///
    /// Recursively loads supported files (txt, md, pdf, docx), splits them
    /// into overlapping chunks, embeds each chunk with the configured
    /// provider, and stores everything in the vector index. Files that fail
    /// to extract are skipped with a warning.
    Ingest {
        /// Directory to ingest, scanned recursively.
        directory: PathBuf,
    },

    /// Ask a question against the indexed documents.
    ///
    /// Embeds the question, retrieves the most similar chunks, and asks the
    /// configured chat model for an answer grounded in them. The exchange
    /// is appended to the user's conversation history so follow-up
    /// questions can refer back to it.
    Ask {
        /// The question to answer.
        query: String,

        /// User whose conversation history frames the question.
        #[arg(long, default_value = "default")]
        user: String,

        /// Number of chunks to retrieve (overrides config).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the retrieved chunks alongside the answer.
        #[arg(long)]
        show_sources: bool,
    },

    /// Show or clear a user's conversation history.
    History {
        /// User whose history to show.
        user: String,

        /// Delete the history instead of showing it.
        #[arg(long)]
        clear: bool,
    },

    /// List users with stored conversation history.
    Users,

    /// Show index statistics.
    Stats,

    /// Remove every record from the vector index.
    ClearIndex,

    /// Remove all records ingested from one source file.
    DeleteSource {
        /// The source path recorded at ingestion time.
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db).await?;
            VectorStore::open(pool, &cfg.db.collection).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { directory } => {
            let store = open_store(&cfg).await?;
            let embedder: Arc<dyn Embedder> = create_embedder(&cfg.embedding)?.into();
            let pipeline = IngestionPipeline::new(
                embedder,
                store,
                cfg.chunking.chunk_size,
                cfg.chunking.chunk_overlap,
                cfg.embedding.batch_size,
            );

            let indexed = pipeline.run(&directory).await?;
            if indexed == 0 {
                println!("No documents found in {}.", directory.display());
            } else {
                println!("Indexed {} chunks from {}.", indexed, directory.display());
            }
        }
        Commands::Ask {
            query,
            user,
            top_k,
            show_sources,
        } => {
            let store = open_store(&cfg).await?;
            let embedder: Arc<dyn Embedder> = create_embedder(&cfg.embedding)?.into();
            let generator = create_generator(&cfg.generation)?;
            let store_mem = Arc::new(ConversationStore::open(&cfg.memory).await?);
            let pipeline = QueryPipeline::new(
                embedder,
                store,
                store_mem,
                generator,
                cfg.memory.context_turns,
            );

            let k = top_k.unwrap_or(cfg.retrieval.top_k);
            let outcome = pipeline.answer(&user, &query, k).await?;

            println!("{}", outcome.answer);
            if show_sources && !outcome.retrieved.is_empty() {
                println!("\nSources:");
                for result in &outcome.retrieved {
                    let source = result
                        .metadata
                        .get("filename")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    println!("  {} (relevance {:.2})", source, result.relevance_score);
                }
            }
        }
        Commands::History { user, clear } => {
            let store = ConversationStore::open(&cfg.memory).await?;
            if clear {
                store.clear(&user).await?;
                println!("Cleared history for {}.", user);
            } else {
                let record = store.get(&user).await?;
                if record.messages.is_empty() {
                    println!("No history for {}.", user);
                } else {
                    for interaction in &record.messages {
                        println!(
                            "[{}] User: {}",
                            interaction.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            interaction.user
                        );
                        println!("           Assistant: {}", interaction.assistant);
                    }
                }
            }
        }
        Commands::Users => {
            let store = ConversationStore::open(&cfg.memory).await?;
            let users = store.list_users().await?;
            if users.is_empty() {
                println!("No stored conversations.");
            } else {
                for user in users {
                    println!("{}", user);
                }
            }
        }
        Commands::Stats => {
            let store = open_store(&cfg).await?;
            println!("Collection: {}", store.collection());
            println!("Records:    {}", store.count().await?);
            match store.dims().await? {
                Some(dims) => println!("Dimensions: {}", dims),
                None => println!("Dimensions: (not yet established)"),
            }
            let conversations = ConversationStore::open(&cfg.memory).await?;
            println!("Users:      {}", conversations.list_users().await?.len());
        }
        Commands::ClearIndex => {
            let store = open_store(&cfg).await?;
            let removed = store.clear().await?;
            println!("Removed {} records.", removed);
        }
        Commands::DeleteSource { path } => {
            let store = open_store(&cfg).await?;
            let removed = store.delete_by_metadata("source_path", &path).await?;
            println!("Removed {} records from {}.", removed, path);
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> anyhow::Result<VectorStore> {
    let pool = db::connect(&cfg.db).await?;
    Ok(VectorStore::open(pool, &cfg.db.collection).await?)
}
