//! # Briefly CLI (`briefly`)
//!
//! The `briefly` binary exercises the ingestion and chat pipeline
//! locally against a SQLite database.
//!
//! ## Usage
//!
//! ```bash
//! briefly --config ./briefly.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `briefly init` | Create the SQLite database and schema |
//! | `briefly ingest <file>` | Chunk, embed, and store a text document |
//! | `briefly search "<query>"` | Search an owner's documents |
//! | `briefly chat "<message>"` | Run one chat exchange through the pipeline |
//! | `briefly delete <document-id>` | Delete a document and its vectors |
//! | `briefly status <document-id>` | Show a document's processing status |
//! | `briefly conversations` | List the owner's conversations |

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use briefly::chat::{ChatPipeline, ChatRequest};
use briefly::config::{self, Config};
use briefly::conversation::{ConversationStore, SqliteConversationStore};
use briefly::db;
use briefly::embedding::OpenAiEmbeddingGateway;
use briefly::generation::OpenAiGenerationBackend;
use briefly::processor::{DocumentProcessor, IngestRequest};
use briefly::registry::{DocumentRegistry, SqliteRegistry, SqliteUsageSink};
use briefly::router::Tier;
use briefly::store::sqlite::SqliteVectorStore;
use briefly::store::SearchOptions;

/// Briefly — a document ingestion and adaptive retrieval-routing
/// pipeline.
#[derive(Parser)]
#[command(
    name = "briefly",
    about = "Document ingestion and adaptive retrieval-routing pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./briefly.toml")]
    config: PathBuf,

    /// Owner all operations are scoped to.
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables.
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Ingest a plain-text document.
    ///
    /// Chunks the file, embeds every chunk in one batch call, and
    /// stores the vectors. Re-ingesting the same document id overwrites
    /// its previous vectors.
    Ingest {
        /// Path to the text file to ingest.
        file: PathBuf,

        /// Document id. Defaults to the file stem.
        #[arg(long)]
        id: Option<String>,

        /// Display name stored with every chunk. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Search the owner's documents.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum relevance in [0, 1] for a result to be returned.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Run one chat exchange through the full pipeline.
    Chat {
        /// The user message.
        message: String,

        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,

        /// Subscription tier: `free`, `pro`, or `pro_byok`.
        #[arg(long, default_value = "free")]
        tier: String,

        /// Prefer the stronger model where the tier permits one.
        #[arg(long)]
        accuracy: bool,
    },

    /// Delete a document and all its vectors.
    Delete {
        /// Document id.
        id: String,
    },

    /// Show a document's processing status.
    Status {
        /// Document id.
        id: String,
    },

    /// List the owner's conversations, most recently active first.
    Conversations,
}

fn parse_tier(s: &str) -> Result<Tier> {
    match s {
        "free" => Ok(Tier::Free),
        "pro" => Ok(Tier::Pro),
        "pro_byok" => Ok(Tier::ProByok),
        other => anyhow::bail!("unknown tier '{}' (expected free, pro, pro_byok)", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("briefly=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            db::init_schema(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, id, name } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let document_id = id.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string())
            });
            let document_name = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| document_id.clone())
            });

            let processor = build_processor(&cfg).await?;
            processor
                .process_document(&IngestRequest {
                    owner_id: cli.owner.clone(),
                    document_id: document_id.clone(),
                    document_name,
                    text,
                    metadata: BTreeMap::new(),
                })
                .await?;
            println!("Ingested document '{}'.", document_id);
        }
        Commands::Search {
            query,
            limit,
            threshold,
        } => {
            let processor = build_processor(&cfg).await?;
            let options = SearchOptions {
                limit: limit.unwrap_or(cfg.retrieval.limit),
                threshold: threshold.unwrap_or(cfg.retrieval.threshold),
                file_ids: None,
            };
            let hits = processor
                .search_documents(&cli.owner, &query, Some(options))
                .await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                let mut snippet = hit.content.replace('\n', " ");
                if snippet.chars().count() > 120 {
                    snippet = snippet.chars().take(120).collect();
                    snippet.push_str("...");
                }
                println!(
                    "{}. [{:.3}] {}: {}",
                    i + 1,
                    hit.relevance,
                    hit.source,
                    snippet
                );
            }
        }
        Commands::Chat {
            message,
            conversation,
            tier,
            accuracy,
        } => {
            let tier = parse_tier(&tier)?;
            let pipeline = build_pipeline(&cfg).await?;
            let response = pipeline
                .chat(&ChatRequest {
                    owner_id: cli.owner.clone(),
                    message,
                    conversation_id: conversation,
                    tier,
                    accuracy_mode: accuracy,
                    has_byok_key: false,
                })
                .await?;

            println!("{}", response.response);
            if !response.sources.is_empty() {
                println!("\nSources:");
                for source in &response.sources {
                    println!("  [{:.3}] {}", source.relevance_score, source.source);
                }
            }
            println!("\nConversation: {}", response.conversation_id);
        }
        Commands::Delete { id } => {
            let processor = build_processor(&cfg).await?;
            processor.delete_document(&cli.owner, &id).await?;
            println!("Deleted document '{}'.", id);
        }
        Commands::Status { id } => {
            let pool = db::connect(&cfg.db.path).await?;
            let registry = SqliteRegistry::new(pool);
            match registry.get(&cli.owner, &id).await? {
                Some(record) => {
                    println!("{}: {}", record.id, record.status.as_str());
                    println!("  name:   {}", record.name);
                    println!("  chunks: {}", record.chunk_count);
                    if let Some(code) = &record.error_code {
                        println!("  error:  {}", code);
                    }
                }
                None => println!("Document '{}' not found.", id),
            }
        }
        Commands::Conversations => {
            let pool = db::connect(&cfg.db.path).await?;
            let store = SqliteConversationStore::new(pool);
            let ids = store.list_conversations(&cli.owner).await?;
            if ids.is_empty() {
                println!("No conversations.");
            }
            for id in ids {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

async fn build_processor(cfg: &Config) -> Result<DocumentProcessor> {
    let pool = db::connect(&cfg.db.path).await?;
    Ok(DocumentProcessor::new(
        Arc::new(OpenAiEmbeddingGateway::new(&cfg.embedding)?),
        Arc::new(SqliteVectorStore::new(pool.clone())),
        Arc::new(SqliteRegistry::new(pool.clone())),
        Arc::new(SqliteUsageSink::new(pool)),
        cfg.chunking.clone(),
        cfg.retrieval.clone(),
    ))
}

async fn build_pipeline(cfg: &Config) -> Result<ChatPipeline> {
    let pool = db::connect(&cfg.db.path).await?;
    Ok(ChatPipeline::new(
        Arc::new(OpenAiEmbeddingGateway::new(&cfg.embedding)?),
        Arc::new(SqliteVectorStore::new(pool.clone())),
        Arc::new(SqliteConversationStore::new(pool.clone())),
        Arc::new(OpenAiGenerationBackend::new(cfg.generation.clone(), None)),
        Arc::new(SqliteUsageSink::new(pool)),
        cfg.retrieval.clone(),
        cfg.confidence,
    ))
}
