//! Hybrid retrieval: BM25 and vector rankings fused with Reciprocal Rank Fusion.
//!
//! Each candidate scores `w_bm25 / (K + rank_bm25) + w_vec / (K + rank_vec)`, with
//! 1-based ranks and an absent ranking contributing nothing. Without a vector
//! index, an embedder, or a working embed call, results are plain BM25 with
//! `combined_score == bm25_score`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use super::bm25::{Bm25Hit, SearchIndex};
use super::vector::VectorIndex;
use crate::embedding::EmbeddingProvider;
use crate::memory::types::CompressedObservation;
use crate::state::{scope, StateKv};

/// RRF smoothing constant.
pub const RRF_K: f64 = 60.0;
pub const DEFAULT_BM25_WEIGHT: f64 = 0.4;
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.6;

/// A fused hit, hydrated with its stored observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchResult {
    pub observation: CompressedObservation,
    pub session_id: String,
    pub bm25_score: f64,
    pub vector_score: f64,
    pub combined_score: f64,
}

#[derive(Debug, Clone)]
struct Candidate {
    obs_id: String,
    session_id: String,
    bm25_score: f64,
    vector_score: f64,
    combined_score: f64,
}

pub struct HybridSearch {
    bm25: Arc<RwLock<SearchIndex>>,
    vector: Option<Arc<RwLock<VectorIndex>>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    kv: StateKv,
    bm25_weight: f64,
    vector_weight: f64,
}

impl HybridSearch {
    pub fn new(
        bm25: Arc<RwLock<SearchIndex>>,
        vector: Option<Arc<RwLock<VectorIndex>>>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        kv: StateKv,
    ) -> Self {
        Self {
            bm25,
            vector,
            embedder,
            kv,
            bm25_weight: DEFAULT_BM25_WEIGHT,
            vector_weight: DEFAULT_VECTOR_WEIGHT,
        }
    }

    /// Override the fusion weights. They need not sum to 1.
    pub fn with_weights(mut self, bm25_weight: f64, vector_weight: f64) -> Self {
        self.bm25_weight = bm25_weight;
        self.vector_weight = vector_weight;
        self
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<HybridSearchResult> {
        let oversample = limit.saturating_mul(2);
        let bm25_hits = {
            let index = self.bm25.read().unwrap_or_else(PoisonError::into_inner);
            index.search(query, oversample)
        };

        let (Some(vector), Some(embedder)) = (&self.vector, &self.embedder) else {
            return self.hydrate(bm25_only(bm25_hits), limit).await;
        };
        if vector.read().unwrap_or_else(PoisonError::into_inner).is_empty() {
            return self.hydrate(bm25_only(bm25_hits), limit).await;
        }

        let query_embedding = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(provider = embedder.name(), error = %e, "query embedding failed, using BM25 only");
                return self.hydrate(bm25_only(bm25_hits), limit).await;
            }
        };

        let vector_hits = {
            let index = vector.read().unwrap_or_else(PoisonError::into_inner);
            index.search(&query_embedding, oversample)
        };

        // (bm25 rank, vector rank), 1-based.
        let mut ranks: HashMap<String, (Option<usize>, Option<usize>)> = HashMap::new();
        let mut candidates: Vec<Candidate> = Vec::new();

        for (i, hit) in bm25_hits.into_iter().enumerate() {
            ranks.insert(hit.obs_id.clone(), (Some(i + 1), None));
            candidates.push(Candidate {
                obs_id: hit.obs_id,
                session_id: hit.session_id,
                bm25_score: hit.score,
                vector_score: 0.0,
                combined_score: 0.0,
            });
        }
        for (i, hit) in vector_hits.into_iter().enumerate() {
            match ranks.get_mut(&hit.obs_id) {
                Some(rank) => {
                    rank.1 = Some(i + 1);
                    if let Some(c) = candidates.iter_mut().find(|c| c.obs_id == hit.obs_id) {
                        c.vector_score = hit.score;
                    }
                }
                None => {
                    ranks.insert(hit.obs_id.clone(), (None, Some(i + 1)));
                    candidates.push(Candidate {
                        obs_id: hit.obs_id,
                        session_id: hit.session_id,
                        bm25_score: 0.0,
                        vector_score: hit.score,
                        combined_score: 0.0,
                    });
                }
            }
        }

        for c in &mut candidates {
            let (bm25_rank, vector_rank) = ranks.get(&c.obs_id).copied().unwrap_or((None, None));
            c.combined_score = self.bm25_weight * rrf(bm25_rank) + self.vector_weight * rrf(vector_rank);
        }

        candidates.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
        self.hydrate(candidates, limit).await
    }

    /// Fetch each hit's observation; hits whose record is gone are dropped.
    async fn hydrate(&self, candidates: Vec<Candidate>, limit: usize) -> Vec<HybridSearchResult> {
        let mut results = Vec::with_capacity(candidates.len().min(limit));
        for c in candidates.into_iter().take(limit) {
            let fetched = self
                .kv
                .get::<CompressedObservation>(&scope::observations(&c.session_id), &c.obs_id)
                .await;
            match fetched {
                Ok(Some(observation)) => results.push(HybridSearchResult {
                    observation,
                    session_id: c.session_id,
                    bm25_score: c.bm25_score,
                    vector_score: c.vector_score,
                    combined_score: c.combined_score,
                }),
                Ok(None) => {
                    tracing::debug!(obs_id = %c.obs_id, "search hit has no backing record, dropped");
                }
                Err(e) => {
                    tracing::warn!(obs_id = %c.obs_id, error = %e, "failed to hydrate search hit");
                }
            }
        }
        results
    }
}

fn rrf(rank: Option<usize>) -> f64 {
    rank.map_or(0.0, |r| 1.0 / (RRF_K + r as f64))
}

fn bm25_only(hits: Vec<Bm25Hit>) -> Vec<Candidate> {
    hits.into_iter()
        .map(|h| Candidate {
            obs_id: h.obs_id,
            session_id: h.session_id,
            bm25_score: h.score,
            vector_score: 0.0,
            combined_score: h.score,
        })
        .collect()
}
