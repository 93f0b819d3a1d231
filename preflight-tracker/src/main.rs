//! preflight - checklist tracker command line
//!
//! ```bash
//! preflight check <checklist.json>
//! preflight replay <checklist.json> <updates.json>
//! ```
//!
//! Logs go to stderr (or `logging.file`); command output (JSON) goes to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use preflight_common::config::TomlConfig;
use preflight_common::events::EventBus;
use preflight_tracker::models::{Checklist, ProgressUpdate};
use preflight_tracker::{ChecklistTracker, DependencyGraph, MemoryStore, ProgressStore};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Parser, Debug)]
#[clap(name = "preflight")]
#[clap(about = "Track progress through dependency-gated checklists")]
struct Cli {
    /// Configuration file (overrides PREFLIGHT_CONFIG)
    #[clap(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a checklist and print its items in dependency order
    Check {
        checklist: PathBuf,
    },
    /// Apply a JSON list of updates and print the resulting progress
    Replay {
        checklist: PathBuf,
        updates: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = TomlConfig::load_or_default(cli.config.as_deref())?;

    let writer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(writer)
        .init();

    info!("preflight {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Check { checklist } => check(&checklist),
        Command::Replay { checklist, updates } => replay(&config, &checklist, &updates).await,
    }
}

fn read_checklist(path: &Path) -> Result<Checklist> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read checklist {}", path.display()))?;
    Ok(Checklist::from_json(&json)?)
}

fn check(path: &Path) -> Result<()> {
    let checklist = read_checklist(path)?;
    checklist.validate()?;
    let graph = DependencyGraph::build(&checklist)?;

    info!(checklist_id = %checklist.id, items = graph.len(), "Checklist is valid");
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "checklist_id": checklist.id,
            "items": graph.len(),
            "order": graph.topological_order(),
        }))?
    );
    Ok(())
}

async fn replay(config: &TomlConfig, checklist_path: &Path, updates_path: &Path) -> Result<()> {
    let checklist = read_checklist(checklist_path)?;
    let updates: Vec<ProgressUpdate> = serde_json::from_str(
        &std::fs::read_to_string(updates_path)
            .with_context(|| format!("Failed to read updates {}", updates_path.display()))?,
    )?;

    let store = open_store(config).await?;
    let tracker = ChecklistTracker::new(store, EventBus::new(config.tracker.event_capacity));

    let checklist_id = checklist.id.clone();
    tracker.register_checklist(checklist).await?;

    let mut outcomes = Vec::with_capacity(updates.len());
    for update in updates {
        let outcome = tracker.submit_update(&checklist_id, update).await?;
        if let Some(rejection) = outcome.rejection() {
            warn!(reason = %rejection, "Update rejected during replay");
        }
        outcomes.push(outcome);
    }

    let progress = tracker.progress(&checklist_id).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "outcomes": outcomes,
            "progress": progress,
        }))?
    );
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store(config: &TomlConfig) -> Result<Arc<dyn ProgressStore>> {
    match &config.tracker.database_path {
        Some(path) => {
            info!("Database: {}", path.display());
            Ok(Arc::new(preflight_tracker::SqliteStore::open(path).await?))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(config: &TomlConfig) -> Result<Arc<dyn ProgressStore>> {
    if config.tracker.database_path.is_some() {
        warn!("database_path is set but sqlite support is not compiled in; using memory store");
    }
    Ok(Arc::new(MemoryStore::new()))
}
