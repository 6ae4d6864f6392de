//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use engram::config::EngramConfig;
use engram::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &EngramConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Any other engram command will create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;

    println!("Engram Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("Embedding:         {}", config.embedding.provider);
    println!();
    println!("Store:");
    println!("  Scopes:          {}", report.scope_count);
    println!("  Rows:            {}", report.row_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED");
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db ~/.engram/state.db");
        println!("  2. Or export from a good copy and reimport:");
        println!("     engram export > backup.json");
        println!("     engram import backup.json --strategy replace");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
