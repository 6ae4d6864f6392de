use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::index::hybrid::{DEFAULT_BM25_WEIGHT, DEFAULT_VECTOR_WEIGHT};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EngramConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub eviction: EvictionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"none"` (BM25-only) or `"hashing"`.
    pub provider: String,
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub bm25_weight: f64,
    pub vector_weight: f64,
    pub default_limit: usize,
}

/// Eviction defaults. A `mem:config` / `eviction` record in the store overrides
/// individual fields at run time.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EvictionConfig {
    pub stale_session_days: i64,
    pub low_importance_max_days: i64,
    pub low_importance_threshold: u8,
    pub max_observations_per_project: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_engram_dir()
            .join("state.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".into(),
            dimensions: 256,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bm25_weight: DEFAULT_BM25_WEIGHT,
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            default_limit: 20,
        }
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            stale_session_days: 30,
            low_importance_max_days: 90,
            low_importance_threshold: 3,
            max_observations_per_project: 10_000,
        }
    }
}

impl SearchConfig {
    /// Weights as used for fusion: negative or NaN falls back to the default,
    /// anything above 1 is clamped to 1.
    pub fn effective_weights(&self) -> (f64, f64) {
        (
            sanitize_weight(self.bm25_weight, DEFAULT_BM25_WEIGHT),
            sanitize_weight(self.vector_weight, DEFAULT_VECTOR_WEIGHT),
        )
    }
}

fn sanitize_weight(value: f64, default: f64) -> f64 {
    if value.is_nan() || value < 0.0 {
        default
    } else {
        value.min(1.0)
    }
}

/// Returns `~/.engram/`, or `./.engram` when no home directory is known.
pub fn default_engram_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".engram")
}

/// Returns the default config file path: `~/.engram/config.toml`
pub fn default_config_path() -> PathBuf {
    default_engram_dir().join("config.toml")
}

impl EngramConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngramConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (ENGRAM_DB, ENGRAM_LOG_LEVEL,
    /// ENGRAM_BM25_WEIGHT, ENGRAM_VECTOR_WEIGHT). Unparseable weights are ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENGRAM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Some(w) = env_f64("ENGRAM_BM25_WEIGHT") {
            self.search.bm25_weight = w;
        }
        if let Some(w) = env_f64("ENGRAM_VECTOR_WEIGHT") {
            self.search.vector_weight = w;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
