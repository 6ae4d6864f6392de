//! In-process BM25 inverted index over compressed observations.
//!
//! Scoring is standard BM25 (k1 = 1.2, b = 0.75) plus a prefix boost: every indexed
//! term that strictly extends a query term contributes the same formula at half
//! its idf. There is no `remove`; evicted observations stay searchable until a
//! rebuild, and hydration drops them from results.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::memory::types::CompressedObservation;

const K1: f64 = 1.2;
const B: f64 = 0.75;
const PREFIX_WEIGHT: f64 = 0.5;

/// A ranked BM25 hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bm25Hit {
    pub obs_id: String,
    pub session_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    obs_id: String,
    session_id: String,
    term_count: u64,
}

#[derive(Debug, Default, Clone)]
pub struct SearchIndex {
    entries: HashMap<String, IndexEntry>,
    /// Ordered so prefix expansion is a range scan.
    inverted: BTreeMap<String, BTreeSet<String>>,
    doc_terms: HashMap<String, HashMap<String, u32>>,
    total_doc_length: u64,
}

/// Wire form of a snapshot. Field layout is shared with other readers of the
/// `mem:index:bm25` scope, hence the tuple lists.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    entries: Vec<(String, IndexEntry)>,
    inverted: Vec<(String, Vec<String>)>,
    doc_terms: Vec<(String, Vec<(String, u32)>)>,
    total_doc_length: u64,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an observation. Re-adding an id replaces its previous contribution.
    pub fn add(&mut self, obs: &CompressedObservation) {
        if self.entries.contains_key(&obs.id) {
            self.remove(&obs.id);
        }

        let terms = extract_terms(obs);
        let mut term_freq: HashMap<String, u32> = HashMap::new();
        for term in &terms {
            *term_freq.entry(term.clone()).or_insert(0) += 1;
        }
        let term_count = terms.len() as u64;

        for term in term_freq.keys() {
            self.inverted
                .entry(term.clone())
                .or_default()
                .insert(obs.id.clone());
        }
        self.entries.insert(
            obs.id.clone(),
            IndexEntry {
                obs_id: obs.id.clone(),
                session_id: obs.session_id.clone(),
                term_count,
            },
        );
        self.doc_terms.insert(obs.id.clone(), term_freq);
        self.total_doc_length += term_count;
    }

    /// Rank documents for `query`, best first. Ties break on id so the order is stable.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Bm25Hit> {
        let query_terms = tokenize(&query.to_lowercase());
        if query_terms.is_empty() {
            return Vec::new();
        }

        let n = self.entries.len();
        if n == 0 {
            return Vec::new();
        }
        let avg_doc_len = self.total_doc_length as f64 / n as f64;

        let mut scores: HashMap<&str, f64> = HashMap::new();

        for term in &query_terms {
            if let Some(docs) = self.inverted.get(term) {
                let idf = idf(n, docs.len());
                self.accumulate(&mut scores, term, docs, idf, avg_doc_len);
            }

            // Strict prefix matches: "auth" also scores "authentication".
            for (index_term, docs) in self
                .inverted
                .range::<String, _>(term.clone()..)
                .take_while(|(t, _)| t.starts_with(term.as_str()))
                .filter(|(t, _)| t.as_str() != term.as_str())
            {
                let prefix_idf = idf(n, docs.len()) * PREFIX_WEIGHT;
                self.accumulate(&mut scores, index_term, docs, prefix_idf, avg_doc_len);
            }
        }

        let mut hits: Vec<Bm25Hit> = scores
            .into_iter()
            .filter_map(|(obs_id, score)| {
                self.entries.get(obs_id).map(|entry| Bm25Hit {
                    obs_id: obs_id.to_string(),
                    session_id: entry.session_id.clone(),
                    score,
                })
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

    fn accumulate<'a>(
        &'a self,
        scores: &mut HashMap<&'a str, f64>,
        term: &str,
        docs: &'a BTreeSet<String>,
        idf: f64,
        avg_doc_len: f64,
    ) {
        for obs_id in docs {
            let Some(entry) = self.entries.get(obs_id) else {
                continue;
            };
            let tf = self
                .doc_terms
                .get(obs_id)
                .and_then(|t| t.get(term))
                .copied()
                .unwrap_or(0) as f64;
            let doc_len = entry.term_count as f64;
            let norm = tf + K1 * (1.0 - B + B * (doc_len / avg_doc_len));
            *scores.entry(obs_id.as_str()).or_insert(0.0) += idf * (tf * (K1 + 1.0)) / norm;
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.inverted.clear();
        self.doc_terms.clear();
        self.total_doc_length = 0;
    }

    /// `(obs_id, session_id)` of every indexed document.
    pub fn documents(&self) -> Vec<(String, String)> {
        self.entries
            .values()
            .map(|e| (e.obs_id.clone(), e.session_id.clone()))
            .collect()
    }

    /// Drop a document and its postings. Unknown ids are ignored.
    pub fn remove(&mut self, obs_id: &str) {
        if let Some(entry) = self.entries.remove(obs_id) {
            self.total_doc_length = self.total_doc_length.saturating_sub(entry.term_count);
        }
        if let Some(terms) = self.doc_terms.remove(obs_id) {
            for term in terms.keys() {
                if let Some(ids) = self.inverted.get_mut(term) {
                    ids.remove(obs_id);
                    if ids.is_empty() {
                        self.inverted.remove(term);
                    }
                }
            }
        }
    }

    /// Lossless JSON snapshot.
    pub fn serialize(&self) -> String {
        let mut entries: Vec<(String, IndexEntry)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let inverted = self
            .inverted
            .iter()
            .map(|(term, ids)| (term.clone(), ids.iter().cloned().collect()))
            .collect();

        let mut doc_terms: Vec<(String, Vec<(String, u32)>)> = self
            .doc_terms
            .iter()
            .map(|(id, counts)| {
                let mut counts: Vec<(String, u32)> =
                    counts.iter().map(|(t, c)| (t.clone(), *c)).collect();
                counts.sort();
                (id.clone(), counts)
            })
            .collect();
        doc_terms.sort_by(|a, b| a.0.cmp(&b.0));

        let snapshot = Snapshot {
            entries,
            inverted,
            doc_terms,
            total_doc_length: self.total_doc_length,
        };
        // Plain strings and integers only; this cannot fail.
        serde_json::to_string(&snapshot).unwrap_or_default()
    }

    /// Restore a snapshot. Malformed input yields an empty index.
    pub fn deserialize(json: &str) -> Self {
        let snapshot: Snapshot = match serde_json::from_str(json) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed BM25 snapshot");
                return Self::new();
            }
        };

        let mut idx = Self::new();
        idx.entries = snapshot.entries.into_iter().collect();
        idx.inverted = snapshot
            .inverted
            .into_iter()
            .map(|(term, ids)| (term, ids.into_iter().collect()))
            .collect();
        idx.doc_terms = snapshot
            .doc_terms
            .into_iter()
            .map(|(id, counts)| (id, counts.into_iter().collect()))
            .collect();
        idx.total_doc_length = snapshot.total_doc_length;
        idx
    }
}

fn idf(n: usize, df: usize) -> f64 {
    let (n, df) = (n as f64, df as f64);
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

fn extract_terms(obs: &CompressedObservation) -> Vec<String> {
    let mut parts: Vec<&str> = vec![
        obs.title.as_str(),
        obs.subtitle.as_deref().unwrap_or(""),
        obs.narrative.as_str(),
    ];
    parts.extend(obs.facts.iter().map(String::as_str));
    parts.extend(obs.concepts.iter().map(String::as_str));
    parts.extend(obs.files.iter().map(String::as_str));
    parts.push(obs.obs_type.as_str());
    tokenize(&parts.join(" ").to_lowercase())
}

/// Keep word characters and path punctuation, split on whitespace, drop 1-char tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '/' | '.' | '-')
            {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}
