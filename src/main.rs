mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use engram::config::EngramConfig;
use engram::memory::transfer::ImportStrategy;
use engram::memory::relations::DEFAULT_HOPS;

#[derive(Parser)]
#[command(name = "engram", version, about = "Memory and retrieval engine for coding-agent sessions")]
struct Cli {
    /// Config file (default: ~/.engram/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hybrid keyword + semantic search over observations
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Rebuild the keyword index from stored observations
    Reindex,
    /// Remove expired memories, demote near-duplicates, prune low-value observations
    AutoForget {
        #[arg(long)]
        dry_run: bool,
    },
    /// Evict stale sessions and low-importance or over-cap observations
    Evict {
        #[arg(long)]
        dry_run: bool,
    },
    /// Show memories related to a memory through the relation graph
    Related {
        memory_id: String,
        #[arg(long, default_value_t = DEFAULT_HOPS)]
        max_hops: u32,
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,
    },
    /// Export everything as JSON to stdout
    Export,
    /// Import a JSON export
    Import {
        file: PathBuf,
        /// merge, replace or skip
        #[arg(long, default_value = "merge")]
        strategy: ImportStrategy,
    },
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngramConfig::load_from(path)?,
        None => EngramConfig::load()?,
    };

    // Log to stderr so stdout stays clean for JSON output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Search { query, limit } => cli::search::search(&config, &query, limit).await?,
        Command::Reindex => cli::maintenance::reindex(&config).await?,
        Command::AutoForget { dry_run } => cli::maintenance::auto_forget(&config, dry_run).await?,
        Command::Evict { dry_run } => cli::maintenance::evict(&config, dry_run).await?,
        Command::Related {
            memory_id,
            max_hops,
            min_confidence,
        } => cli::related::related(&config, &memory_id, max_hops, min_confidence).await?,
        Command::Export => cli::export::export(&config).await?,
        Command::Import { file, strategy } => {
            cli::import::import(&config, &file, strategy).await?
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
