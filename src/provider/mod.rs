//! The LLM compression capability and its resilience decorators.
//!
//! [`Compressor`] is the only view the engine has of an LLM vendor. Both
//! decorators implement the trait they wrap, so they nest in either order:
//! `ResilientCompressor::new(Arc::new(FallbackChain::new(..)))` and
//! `FallbackChain::new(vec![Arc::new(ResilientCompressor::new(..)), ..])` are
//! both plain `Arc<dyn Compressor>`.

pub mod circuit_breaker;
pub mod fallback;
pub mod resilient;

use async_trait::async_trait;

use crate::error::ProviderError;

pub use circuit_breaker::{BreakerPolicy, CircuitBreaker, CircuitSnapshot, CircuitState};
pub use fallback::FallbackChain;
pub use resilient::ResilientCompressor;

/// Turns raw prompts into compressed text. Calls may fail.
#[async_trait]
pub trait Compressor: Send + Sync {
    fn name(&self) -> &str;

    async fn compress(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError>;

    async fn summarize(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, ProviderError>;
}
