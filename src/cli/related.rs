//! CLI `related` command: walk the relation graph around one memory.

use anyhow::Result;

use engram::config::EngramConfig;

pub async fn related(
    config: &EngramConfig,
    memory_id: &str,
    max_hops: u32,
    min_confidence: f64,
) -> Result<()> {
    let engine = super::open_engine(config).await?;
    let related = engine
        .get_related(memory_id, max_hops, min_confidence)
        .await?;

    if related.is_empty() {
        println!("No related memories within {max_hops} hop(s).");
    } else {
        println!(
            "{:<38} {:<5} {:<10} {:<13} {}",
            "ID", "Hop", "Confidence", "Type", "Title"
        );
        println!("{}", "-".repeat(100));
        for r in &related {
            println!(
                "{:<38} {:<5} {:<10.2} {:<13} {}",
                r.memory.id,
                r.hop,
                r.confidence,
                r.memory.memory_type,
                super::preview(&r.memory.title, 40)
            );
        }
    }

    engine.shutdown().await?;
    Ok(())
}
