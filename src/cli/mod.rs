pub mod doctor;
pub mod export;
pub mod import;
pub mod maintenance;
pub mod related;
pub mod search;

use anyhow::{Context, Result};
use std::sync::Arc;

use engram::config::EngramConfig;
use engram::engine::Engine;
use engram::state::SqliteStateStore;

/// Open the SQLite store at the configured path and build an engine over it.
pub async fn open_engine(config: &EngramConfig) -> Result<Engine> {
    let db_path = config.resolved_db_path();
    let store = SqliteStateStore::open(&db_path)?;
    let embedder = engram::embedding::create_provider(&config.embedding)?;

    Engine::open(Arc::new(store), embedder, config)
        .await
        .with_context(|| format!("failed to open engine over {}", db_path.display()))
}

/// Shorten `s` to `max` characters for one-line display.
pub fn preview(s: &str, max: usize) -> String {
    let cut = engram::memory::truncate_chars(s, max);
    if cut.len() < s.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}
