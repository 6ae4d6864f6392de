//! Circuit-breaker decorator for any [`Compressor`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::circuit_breaker::{BreakerPolicy, CircuitBreaker, CircuitSnapshot};
use super::Compressor;
use crate::error::ProviderError;

pub struct ResilientCompressor {
    inner: Arc<dyn Compressor>,
    breaker: CircuitBreaker,
    timeout: Option<Duration>,
    name: String,
}

impl ResilientCompressor {
    pub fn new(inner: Arc<dyn Compressor>) -> Self {
        Self::with_policy(inner, BreakerPolicy::default())
    }

    pub fn with_policy(inner: Arc<dyn Compressor>, policy: BreakerPolicy) -> Self {
        let name = format!("resilient({})", inner.name());
        Self {
            inner,
            breaker: CircuitBreaker::new(policy),
            timeout: None,
            name,
        }
    }

    /// Fail calls that run longer than `timeout`; a timeout counts as a failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn circuit_state(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    async fn guarded<F>(&self, call: F) -> Result<String, ProviderError>
    where
        F: Future<Output = Result<String, ProviderError>> + Send,
    {
        if !self.breaker.is_allowed() {
            return Err(ProviderError::CircuitOpen {
                provider: self.inner.name().to_string(),
            });
        }

        let result = match self.timeout {
            Some(after) => match tokio::time::timeout(after, call).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Timeout {
                    provider: self.inner.name().to_string(),
                    after,
                }),
            },
            None => call.await,
        };

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) => {
                tracing::debug!(provider = self.inner.name(), error = %e, "provider call failed");
                self.breaker.record_failure();
            }
        }
        result
    }
}

#[async_trait]
impl Compressor for ResilientCompressor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compress(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        self.guarded(self.inner.compress(system_prompt, user_prompt))
            .await
    }

    async fn summarize(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        self.guarded(self.inner.summarize(system_prompt, user_prompt))
            .await
    }
}
