//! Feature-hashing embedding provider.
//!
//! Each token (same tokenizer as the BM25 index) is hashed with SHA-256 into a
//! bucket and a sign; the bucket counts are L2-normalized. Texts sharing
//! vocabulary land close together, which is enough for the semantic half of
//! hybrid search when no model is configured.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::error::ProviderError;
use crate::index::bm25::tokenize;

pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(&text.to_lowercase()) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::vector::cosine_similarity;

    #[tokio::test]
    async fn deterministic_and_normalized() {
        let provider = HashingEmbeddingProvider::new(128);
        let a = provider.embed("auth middleware jwt").await.unwrap();
        let b = provider.embed("auth middleware jwt").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_is_closer() {
        let provider = HashingEmbeddingProvider::new(256);
        let query = provider.embed("auth middleware").await.unwrap();
        let related = provider.embed("edit the auth middleware").await.unwrap();
        let unrelated = provider.embed("kubernetes helm chart").await.unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn empty_text_is_zero_vector() {
        let provider = HashingEmbeddingProvider::new(8);
        let v = provider.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn batch_matches_single() {
        let provider = HashingEmbeddingProvider::new(32);
        let texts = vec!["one text".to_string(), "another text".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[1], provider.embed("another text").await.unwrap());
    }
}
