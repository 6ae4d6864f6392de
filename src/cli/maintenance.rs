//! CLI maintenance commands: `reindex`, `auto-forget` and `evict`.

use anyhow::Result;

use engram::config::EngramConfig;

/// Rebuild the keyword index from the stored observations and save it.
pub async fn reindex(config: &EngramConfig) -> Result<()> {
    let engine = super::open_engine(config).await?;
    let count = engine.rebuild_index().await?;
    engine.shutdown().await?;
    println!("Indexed {count} observation(s).");
    Ok(())
}

pub async fn auto_forget(config: &EngramConfig, dry_run: bool) -> Result<()> {
    let engine = super::open_engine(config).await?;
    let report = engine.auto_forget(dry_run).await?;
    engine.shutdown().await?;

    let verb = if dry_run { "Would remove" } else { "Removed" };
    println!("{verb} {} expired memories.", report.ttl_expired.len());
    println!(
        "Found {} near-duplicate pair(s); older members {}.",
        report.contradictions.len(),
        if dry_run { "left as is (dry run)" } else { "demoted" }
    );
    for c in &report.contradictions {
        println!("  {} ~ {} ({:.3})", c.memory_a, c.memory_b, c.similarity);
    }
    println!(
        "{verb} {} low-value observation(s).",
        report.low_value_obs.len()
    );
    Ok(())
}

pub async fn evict(config: &EngramConfig, dry_run: bool) -> Result<()> {
    let engine = super::open_engine(config).await?;
    let stats = engine.evict(dry_run).await?;
    engine.shutdown().await?;

    if dry_run {
        println!("Eviction dry run, nothing deleted:");
    } else {
        println!("Eviction complete:");
    }
    println!("  Stale sessions:          {}", stats.stale_sessions);
    println!("  Low-importance obs:      {}", stats.low_importance_obs);
    println!("  Over project cap:        {}", stats.cap_evictions);
    Ok(())
}
