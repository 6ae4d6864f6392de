//! Ordered fallback across several [`Compressor`]s.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::Compressor;
use crate::error::ProviderError;

/// Tries each provider in order and returns the first success. When every
/// provider fails, the last error is returned unchanged.
pub struct FallbackChain {
    providers: Vec<Arc<dyn Compressor>>,
    name: String,
}

type Attempt<'a> = Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn Compressor>>) -> Self {
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        let name = format!("fallback({})", names.join(" -> "));
        Self { providers, name }
    }

    async fn try_each<'a, F>(&'a self, operation: &str, call: F) -> Result<String, ProviderError>
    where
        F: Fn(&'a dyn Compressor) -> Attempt<'a>,
    {
        let mut last_error = ProviderError::NoProviders;
        for provider in &self.providers {
            match call(provider.as_ref()).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    tracing::debug!(provider = provider.name(), error = %e, "{operation} failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[async_trait]
impl Compressor for FallbackChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compress(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        self.try_each("compress", |p| p.compress(system_prompt, user_prompt))
            .await
    }

    async fn summarize(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        self.try_each("summarize", |p| p.summarize(system_prompt, user_prompt))
            .await
    }
}
