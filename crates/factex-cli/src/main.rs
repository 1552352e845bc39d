//! factex CLI - command-line shell over the fact extraction engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use factex_core::{
    DocumentReader, FactUpdate, FactexConfig, FactexError, Result, SearchFilter,
    VerificationStatus,
};
use factex_embed::OnnxEmbedder;
use factex_llm::ChatCompletionsClient;
use factex_pipeline::FactEngine;

/// factex - extract and verify facts from documents
#[derive(Parser)]
#[command(name = "factex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/factex/config.toml, then ./factex.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a document for fact extraction
    Submit {
        /// Path to a UTF-8 text file
        path: PathBuf,

        /// Document name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List stored facts
    Facts {
        /// Restrict to one document
        #[arg(short, long)]
        document: Option<String>,

        /// Include rejected facts
        #[arg(long)]
        all: bool,
    },

    /// Semantic search over verified facts
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Restrict to one document
        #[arg(short, long)]
        document: Option<String>,
    },

    /// Edit a fact's statement or flip its status
    Update {
        /// Fact id
        fact_id: String,

        /// New statement text
        #[arg(long)]
        statement: Option<String>,

        /// New status: verified or rejected
        #[arg(long)]
        status: Option<String>,

        /// Reason for the change
        #[arg(long)]
        reason: Option<String>,
    },

    /// Remove a document and everything extracted from it
    Purge {
        /// Document name
        document: String,
    },

    /// Show store statistics
    Stats,
}

/// Plain-text document reader. Format-specific readers (PDF, word
/// processor) plug in behind the same trait.
struct PlainTextReader;

impl DocumentReader for PlainTextReader {
    fn read(&self, path: &Path) -> Result<(String, String)> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !matches!(extension.as_str(), "txt" | "md" | "text" | "") {
            return Err(FactexError::UnsupportedFormat { extension });
        }

        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok((text, name))
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&Path>) -> Result<FactexConfig> {
    match path {
        Some(path) => FactexConfig::load(path),
        None => FactexConfig::load_default(),
    }
}

fn build_engine(config: FactexConfig) -> Result<FactEngine> {
    let llm = Arc::new(ChatCompletionsClient::new(&config.llm)?);
    let embedder = Arc::new(OnnxEmbedder::from_dir(&config.embedding.model_dir)?);
    FactEngine::new(config, llm, embedder)
}

fn parse_status(raw: &str) -> Result<VerificationStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "verified" => Ok(VerificationStatus::Verified),
        "rejected" => Ok(VerificationStatus::Rejected),
        other => Err(FactexError::config(format!(
            "invalid status {:?}: expected verified or rejected",
            other
        ))),
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Submit { path, name } => {
            let reader = PlainTextReader;
            let (text, detected_name) = reader.read(&path)?;
            let document_name = name.unwrap_or(detected_name);
            let source_uri = format!("file://{}", path.display());

            let engine = build_engine(config)?;
            let report = engine.submit(&document_name, &text, &source_uri).await?;

            if report.already_complete {
                println!("{}: already fully processed, nothing to do", document_name);
            } else {
                println!(
                    "{}: {} chunks processed ({} skipped), {} candidates, {} verified, {} rejected",
                    document_name,
                    report.chunks_processed,
                    report.chunks_skipped,
                    report.candidates_extracted,
                    report.verified,
                    report.rejected,
                );
                for error in &report.errors {
                    eprintln!("  error: {}", error);
                }
            }
        }

        Commands::Facts { document, all } => {
            let engine = build_engine(config)?;
            let facts = engine.get_facts(document.as_deref(), !all);
            if facts.is_empty() {
                println!("no facts stored");
            }
            for fact in facts {
                println!(
                    "[{}] ({}) {} — {}",
                    fact.fact_id, fact.verification_status, fact.statement, fact.document_name
                );
            }
        }

        Commands::Search {
            query,
            top_k,
            document,
        } => {
            let engine = build_engine(config)?;
            let filter = document.map(SearchFilter::for_document);
            let hits = engine.search(&query, top_k, filter).await?;
            if hits.is_empty() {
                println!("no results");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({}, chunk {})",
                    rank + 1,
                    hit.similarity,
                    hit.fact.statement,
                    hit.fact.document_name,
                    hit.fact.source_chunk_index,
                );
            }
        }

        Commands::Update {
            fact_id,
            statement,
            status,
            reason,
        } => {
            let new_status = status.as_deref().map(parse_status).transpose()?;
            let engine = build_engine(config)?;
            let fact = engine
                .update_fact(
                    &fact_id,
                    FactUpdate {
                        new_statement: statement,
                        new_status,
                        reason,
                    },
                )
                .await?;
            println!("updated [{}] -> ({}) {}", fact.fact_id, fact.verification_status, fact.statement);
        }

        Commands::Purge { document } => {
            let engine = build_engine(config)?;
            let removed = engine.purge_document(&document).await?;
            println!("removed {} rows for {}", removed, document);
        }

        Commands::Stats => {
            let engine = build_engine(config)?;
            let stats = engine.stats();
            println!("verified facts:  {}", stats.verified_facts);
            println!("rejected facts:  {}", stats.rejected_facts);
            println!("chunks:          {}", stats.chunks);
            println!("vector entries:  {}", stats.vector_entries);
        }
    }

    Ok(())
}
