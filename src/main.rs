//! claims-ged CLI: watch an inbox, index claims documents, drain workflow triggers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use thiserror::Error;

use claims_ged::config::{self, ConfigError, IngestConfig};
use claims_ged::db::{repository, Database, DatabaseError};
use claims_ged::models::{DocumentType, SearchCriteria, TriggerType};
use claims_ged::pipeline::{
    default_extractor, scan_directory, DocumentProcessor, ExtensionFilter, FolderWatcher,
    IngestError, ProcessingError, ProcessingOutcome,
};

#[derive(Parser)]
#[command(name = "claims-ged", version, about = "Claims document ingestion and indexing")]
struct Cli {
    /// Config file (TOML). Defaults to ~/ClaimsGed/config.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the config file and environment.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and index new documents until interrupted.
    Watch {
        /// Directory to watch (defaults to the configured inbox).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Only watch the top-level directory.
        #[arg(long)]
        no_recursive: bool,

        /// Do not enqueue files already present at startup.
        #[arg(long)]
        skip_existing: bool,
    },

    /// Process a single file now.
    Process {
        file: PathBuf,
    },

    /// Process every matching file under a directory once.
    Rescan {
        dir: PathBuf,

        #[arg(long)]
        no_recursive: bool,
    },

    /// Search the document index.
    Search {
        #[arg(long)]
        client: Option<String>,

        #[arg(long)]
        reference: Option<String>,

        #[arg(long)]
        counterpart: Option<String>,

        #[arg(long)]
        keyword: Option<String>,

        /// BORDEREAU, FACTURE, RECLAMATION, BULLETIN_SOIN or DOCUMENT_GENERAL.
        #[arg(long = "type", value_parser = parse_document_type)]
        document_type: Option<DocumentType>,

        /// Inclusive lower bound (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Inclusive upper bound (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show index and processing statistics.
    Stats,

    /// Inspect and complete workflow triggers.
    Triggers {
        #[command(subcommand)]
        action: TriggerAction,
    },
}

#[derive(Subcommand)]
enum TriggerAction {
    /// List pending triggers, oldest first.
    Pending {
        #[arg(long = "type", value_parser = parse_trigger_type)]
        trigger_type: Option<TriggerType>,
    },
    /// Mark a trigger executed.
    Execute {
        id: i64,
    },
    /// Mark a trigger failed.
    Fail {
        id: i64,

        #[arg(long)]
        reason: String,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("Output encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Signal handling failed: {0}")]
    Signal(#[source] std::io::Error),
}

fn parse_document_type(s: &str) -> Result<DocumentType, String> {
    DocumentType::from_str(&s.to_uppercase()).map_err(|e| e.to_string())
}

fn parse_trigger_type(s: &str) -> Result<TriggerType, String> {
    TriggerType::from_str(&s.to_uppercase()).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    claims_ged::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = IngestConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    tracing::info!(
        version = config::APP_VERSION,
        database = %config.database_path.display(),
        "claims-ged starting"
    );
    let db = Arc::new(Database::open(&config.database_path)?);

    match cli.command {
        Commands::Watch {
            dir,
            no_recursive,
            skip_existing,
        } => {
            let dir = dir.unwrap_or_else(|| config.watch_dir.clone());
            let recursive = config.recursive && !no_recursive;
            watch(&config, db, &dir, recursive, skip_existing).await
        }

        Commands::Process { file } => {
            let processor = build_processor(&config, db);
            let outcome = tokio::task::spawn_blocking(move || processor.process(&file))
                .await
                .map_err(|e| IngestError::Configuration(format!("processing task failed: {e}")))??;
            print_json(&outcome)
        }

        Commands::Rescan { dir, no_recursive } => {
            let recursive = config.recursive && !no_recursive;
            rescan(&config, db, &dir, recursive).await
        }

        Commands::Search {
            client,
            reference,
            counterpart,
            keyword,
            document_type,
            from,
            to,
            limit,
        } => {
            let criteria = SearchCriteria {
                client_name: client,
                document_reference: reference,
                counterpart_name: counterpart,
                keyword,
                document_type,
                date_from: from,
                date_to: to,
                limit,
            };
            let docs = db.with_conn(|conn| repository::search_documents(conn, &criteria))?;
            for doc in &docs {
                println!("{}", serde_json::to_string(doc)?);
            }
            Ok(())
        }

        Commands::Stats => {
            let stats = db.with_conn(|conn| repository::get_processing_stats(conn))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }

        Commands::Triggers { action } => match action {
            TriggerAction::Pending { trigger_type } => {
                let pending = db.with_conn(|conn| repository::list_pending(conn, trigger_type))?;
                for trigger in &pending {
                    println!("{}", serde_json::to_string(trigger)?);
                }
                Ok(())
            }
            TriggerAction::Execute { id } => {
                let trigger = db.with_conn(|conn| repository::mark_executed(conn, id))?;
                print_json(&trigger)
            }
            TriggerAction::Fail { id, reason } => {
                let trigger = db.with_conn(|conn| repository::mark_failed(conn, id, &reason))?;
                print_json(&trigger)
            }
        },
    }
}

fn build_processor(config: &IngestConfig, db: Arc<Database>) -> Arc<DocumentProcessor> {
    Arc::new(DocumentProcessor::new(
        db,
        default_extractor(),
        config.processor_options(),
    ))
}

async fn watch(
    config: &IngestConfig,
    db: Arc<Database>,
    dir: &Path,
    recursive: bool,
    skip_existing: bool,
) -> Result<(), CliError> {
    let processor = build_processor(config, db);
    let mut watcher = FolderWatcher::new(processor, config.watcher_options());
    watcher.start(dir, recursive, &config.extensions)?;

    if !skip_existing {
        watcher.rescan(dir, recursive, &config.extensions).await?;
    }

    if let Some(root) = watcher.root() {
        println!("Watching {} (Ctrl-C to stop)", root.display());
    }
    let signal = tokio::signal::ctrl_c().await;

    let report = watcher.stop().await?;
    if !report.abandoned.is_empty() {
        eprintln!("{} queued file(s) abandoned at shutdown", report.abandoned.len());
    }
    signal.map_err(CliError::Signal)
}

/// One-shot pass over a directory, sequential, reporting each outcome.
async fn rescan(
    config: &IngestConfig,
    db: Arc<Database>,
    dir: &Path,
    recursive: bool,
) -> Result<(), CliError> {
    let files = scan_directory(dir, recursive, &ExtensionFilter::new(&config.extensions))?;
    let processor = build_processor(config, db);

    let mut processed = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for file in files {
        let worker = Arc::clone(&processor);
        let outcome = tokio::task::spawn_blocking(move || worker.process(&file))
            .await
            .map_err(|e| IngestError::Configuration(format!("processing task failed: {e}")))??;
        match &outcome {
            ProcessingOutcome::Processed { .. } => processed += 1,
            ProcessingOutcome::Failed { .. } => failed += 1,
            _ => skipped += 1,
        }
        println!("{}", serde_json::to_string(&outcome)?);
    }

    println!("processed={processed} skipped={skipped} failed={failed}");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
