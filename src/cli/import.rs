use anyhow::{Context, Result};
use std::path::Path;

use engram::config::EngramConfig;
use engram::memory::transfer::{ExportData, ImportStrategy};

/// Import an `engram export` document from a JSON file.
///
/// The whole file is validated before anything is written; a rejected file
/// leaves the store unchanged.
pub async fn import(config: &EngramConfig, file: &Path, strategy: ImportStrategy) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let data: ExportData = serde_json::from_str(&json).context("failed to parse import JSON")?;

    let engine = super::open_engine(config).await?;
    let stats = engine.import(&data, strategy).await?;
    engine.shutdown().await?;

    println!("Import complete ({strategy:?}):");
    println!("  Sessions:      {}", stats.sessions);
    println!("  Observations:  {}", stats.observations);
    println!("  Memories:      {}", stats.memories);
    println!("  Summaries:     {}", stats.summaries);
    println!("  Relations:     {}", stats.relations);
    if stats.skipped > 0 {
        println!("  Skipped:       {} (already exist)", stats.skipped);
    }
    Ok(())
}
