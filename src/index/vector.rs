//! Exact cosine-similarity index over embedding vectors.
//!
//! Linear scan on every query; at thousands of observations this is cheaper than
//! maintaining an ANN structure. Snapshots encode each vector as base64 of its
//! little-endian f32 bytes.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
struct VectorEntry {
    embedding: Vec<f32>,
    session_id: String,
}

/// A ranked vector hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub obs_id: String,
    pub session_id: String,
    pub score: f64,
}

#[derive(Debug, Default, Clone)]
pub struct VectorIndex {
    entries: HashMap<String, VectorEntry>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    embedding: String,
    session_id: String,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, obs_id: &str, session_id: &str, embedding: Vec<f32>) {
        self.entries.insert(
            obs_id.to_string(),
            VectorEntry {
                embedding,
                session_id: session_id.to_string(),
            },
        );
    }

    pub fn remove(&mut self, obs_id: &str) {
        self.entries.remove(obs_id);
    }

    pub fn search(&self, query: &[f32], limit: usize) -> Vec<VectorHit> {
        let mut hits: Vec<VectorHit> = self
            .entries
            .iter()
            .map(|(id, entry)| VectorHit {
                obs_id: id.clone(),
                session_id: entry.session_id.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.obs_id.cmp(&b.obs_id))
        });
        hits.truncate(limit);
        hits
    }

    /// `(obs_id, session_id)` of every stored vector.
    pub fn documents(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.session_id.clone()))
            .collect()
    }

    pub fn contains(&self, obs_id: &str) -> bool {
        self.entries.contains_key(obs_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn serialize(&self) -> String {
        let mut rows: Vec<(&String, WireEntry)> = self
            .entries
            .iter()
            .map(|(id, entry)| {
                let bytes: Vec<u8> = entry
                    .embedding
                    .iter()
                    .flat_map(|f| f.to_le_bytes())
                    .collect();
                (
                    id,
                    WireEntry {
                        embedding: STANDARD.encode(bytes),
                        session_id: entry.session_id.clone(),
                    },
                )
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    /// Restore a snapshot, silently skipping rows that do not decode.
    pub fn deserialize(json: &str) -> Self {
        let mut idx = Self::new();
        let rows: Vec<serde_json::Value> = match serde_json::from_str(json) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed vector snapshot");
                return idx;
            }
        };

        for row in rows {
            let Ok((id, wire)) = serde_json::from_value::<(String, WireEntry)>(row) else {
                continue;
            };
            let Some(embedding) = decode_embedding(&wire.embedding) else {
                continue;
            };
            idx.entries.insert(
                id,
                VectorEntry {
                    embedding,
                    session_id: wire.session_id,
                },
            );
        }
        idx
    }
}

fn decode_embedding(encoded: &str) -> Option<Vec<f32>> {
    let bytes = STANDARD.decode(encoded).ok()?;
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Cosine similarity; 0.0 for mismatched lengths or a zero-norm side.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    let sim = dot / denom;
    if sim.is_nan() {
        0.0
    } else {
        sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identity_orthogonal_and_zero() {
        let v = [0.3f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn search_orders_by_similarity_and_limits() {
        let mut idx = VectorIndex::new();
        idx.add("near", "s1", vec![1.0, 0.1]);
        idx.add("far", "s1", vec![0.0, 1.0]);
        idx.add("mid", "s2", vec![1.0, 1.0]);

        let hits = idx.search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].obs_id, "near");
        assert_eq!(hits[1].obs_id, "mid");
        assert_eq!(hits[1].session_id, "s2");
    }

    #[test]
    fn remove_drops_entry() {
        let mut idx = VectorIndex::new();
        idx.add("a", "s", vec![1.0]);
        idx.remove("a");
        assert!(idx.is_empty());
        idx.remove("missing");
    }

    #[test]
    fn snapshot_round_trip_is_bit_exact() {
        let mut idx = VectorIndex::new();
        idx.add("a", "s1", vec![0.1, -2.5, 3.25e-7]);
        idx.add("b", "s2", vec![1.0, 0.0, 0.0]);

        let restored = VectorIndex::deserialize(&idx.serialize());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.entries["a"].embedding, vec![0.1, -2.5, 3.25e-7]);
        assert_eq!(restored.entries["b"].session_id, "s2");
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let json = r#"[
            ["good", {"embedding": "AACAPw==", "sessionId": "s"}],
            ["short", {"embedding": "AAA=", "sessionId": "s"}],
            ["bad64", {"embedding": "!!!", "sessionId": "s"}],
            "garbage"
        ]"#;
        let idx = VectorIndex::deserialize(json);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.entries["good"].embedding, vec![1.0]);

        assert!(VectorIndex::deserialize("{oops").is_empty());
    }
}
