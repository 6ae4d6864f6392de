//! Text-to-vector embedding capability.
//!
//! The engine only sees [`EmbeddingProvider`]; its absence is a supported
//! configuration (BM25-only search). The built-in [`hashing`] provider is a
//! deterministic feature-hashing model that needs no network or model files.
//! Remote providers plug in behind the same trait.

pub mod hashing;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ProviderError;

/// Embeds text into fixed-dimension vectors.
///
/// Every vector from one instance has exactly [`dimensions`](Self::dimensions) components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed several texts. Implementations may override for batched inference.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Build the configured provider, or `None` for BM25-only mode.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    match config.provider.as_str() {
        "none" | "" => Ok(None),
        "hashing" => {
            anyhow::ensure!(config.dimensions > 0, "embedding dimensions must be positive");
            Ok(Some(Arc::new(hashing::HashingEmbeddingProvider::new(
                config.dimensions,
            ))))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: none, hashing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    #[test]
    fn none_provider_means_bm25_only() {
        let config = EmbeddingConfig {
            provider: "none".into(),
            dimensions: 256,
        };
        assert!(create_provider(&config).unwrap().is_none());
    }

    #[test]
    fn hashing_provider_uses_configured_dimensions() {
        let config = EmbeddingConfig {
            provider: "hashing".into(),
            dimensions: 64,
        };
        let provider = create_provider(&config).unwrap().unwrap();
        assert_eq!(provider.dimensions(), 64);
        assert_eq!(provider.name(), "hashing");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "onnx".into(),
            dimensions: 384,
        };
        assert!(create_provider(&config).is_err());
    }
}
