//! Error taxonomy for the engine.
//!
//! Capability and graph errors are typed so callers can tell a fail-fast
//! [`ProviderError::CircuitOpen`] apart from a genuine provider failure, or a
//! missing memory apart from a storage outage. Application glue (config, CLI)
//! uses `anyhow` on top of these.

use std::time::Duration;

use thiserror::Error;

/// Failure of the durable key-value substrate (transient I/O).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the call.
    #[error("state store backend error: {0}")]
    Backend(String),
    /// A value could not be converted to or from JSON.
    #[error("state store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A blocking worker task panicked or was cancelled.
    #[error("state store worker failed: {0}")]
    Worker(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Failure of a `Compressor` or `EmbeddingProvider` call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The circuit breaker refused the call without contacting the provider.
    #[error("circuit breaker open for {provider}")]
    CircuitOpen { provider: String },
    /// The provider was called and failed.
    #[error("{provider} failed: {message}")]
    Failure { provider: String, message: String },
    /// The call did not finish within the caller-imposed deadline.
    #[error("{provider} timed out after {after:?}")]
    Timeout { provider: String, after: Duration },
    /// A fallback chain was built with no members.
    #[error("no providers available")]
    NoProviders,
}

impl ProviderError {
    pub fn failure(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// `true` when the call was rejected by a breaker rather than attempted.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Failure of a relation-graph mutation (`relate`, `evolve`).
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("memory not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Malformed bulk input, rejected before any mutation.
#[derive(Debug, Error)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

/// Failure of a validated write (`remember`, bulk import).
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
