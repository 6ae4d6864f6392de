use anyhow::Result;

use engram::config::EngramConfig;

/// Export every session, observation, memory, summary and relation as JSON to stdout.
pub async fn export(config: &EngramConfig) -> Result<()> {
    let engine = super::open_engine(config).await?;
    let data = engine.export().await?;
    engine.shutdown().await?;

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    let total_obs: usize = data.observations.values().map(Vec::len).sum();
    eprintln!(
        "Exported {} sessions, {} observations, {} memories, {} summaries, {} relations.",
        data.sessions.len(),
        total_obs,
        data.memories.len(),
        data.summaries.len(),
        data.relations.len()
    );
    Ok(())
}
