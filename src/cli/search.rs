use anyhow::Result;

use engram::config::EngramConfig;

/// Run a hybrid search from the terminal.
pub async fn search(config: &EngramConfig, query: &str, limit: Option<usize>) -> Result<()> {
    let engine = super::open_engine(config).await?;
    let results = engine.search(query, limit).await;

    if results.is_empty() {
        println!("No results found.");
    } else {
        println!("Found {} result(s)\n", results.len());
        for (i, result) in results.iter().enumerate() {
            let obs = &result.observation;
            println!(
                "  {}. [{}] {} (session: {}, score: {:.4})",
                i + 1,
                obs.obs_type,
                obs.id,
                result.session_id,
                result.combined_score,
            );
            println!("     {}", super::preview(&obs.title, 120));
            if !obs.narrative.is_empty() {
                println!("     {}", super::preview(&obs.narrative, 120));
            }
            println!();
        }
    }

    engine.shutdown().await?;
    Ok(())
}
