//! Explicit forgetting and the automatic forgetting sweep.
//!
//! [`forget`] deletes what the caller names. [`auto_forget`] removes expired
//! memories, soft-demotes near-duplicate memories, and prunes old low-value
//! observations. Both are hard deletes against the StateStore; the BM25 index is
//! not touched (hits on deleted observations are dropped at hydration).

use std::collections::HashSet;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::jaccard_similarity;
use super::types::{CompressedObservation, Memory, Session};
use crate::error::StoreError;
use crate::state::{scope, StateKv};

/// Jaccard similarity above which two latest memories are treated as contradicting.
pub const CONTRADICTION_THRESHOLD: f64 = 0.9;
/// Only this many of the most recent latest memories are compared pairwise.
pub const CONTRADICTION_SCAN_LIMIT: usize = 1000;
pub const LOW_VALUE_MAX_AGE_DAYS: i64 = 180;
pub const LOW_VALUE_MAX_IMPORTANCE: u8 = 2;

/// What to forget. Exactly which fields are set picks the mode:
/// `memory_id` deletes one memory; `session_id` + `observation_ids` deletes those
/// observations; `session_id` alone deletes the whole session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgetRequest {
    pub memory_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub observation_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForgetOutcome {
    pub deleted: usize,
}

pub async fn forget(kv: &StateKv, request: &ForgetRequest) -> Result<ForgetOutcome, StoreError> {
    let mut deleted = 0;

    if let Some(memory_id) = &request.memory_id {
        kv.delete(scope::MEMORIES, memory_id).await?;
        deleted += 1;
    }

    if let Some(session_id) = &request.session_id {
        let obs_scope = scope::observations(session_id);
        if !request.observation_ids.is_empty() {
            for obs_id in &request.observation_ids {
                kv.delete(&obs_scope, obs_id).await?;
                deleted += 1;
            }
        } else if request.memory_id.is_none() {
            let observations: Vec<serde_json::Value> = kv.list(&obs_scope).await?;
            for obs in observations {
                if let Some(obs_id) = obs.get("id").and_then(|v| v.as_str()) {
                    kv.delete(&obs_scope, obs_id).await?;
                    deleted += 1;
                }
            }
            kv.delete(scope::SESSIONS, session_id).await?;
            kv.delete(scope::SUMMARIES, session_id).await?;
            deleted += 2;
        }
    }

    tracing::info!(deleted, "memory forgotten");
    Ok(ForgetOutcome { deleted })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contradiction {
    pub memory_a: String,
    pub memory_b: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoForgetReport {
    pub ttl_expired: Vec<String>,
    pub contradictions: Vec<Contradiction>,
    pub low_value_obs: Vec<String>,
    pub dry_run: bool,
}

/// Run the three forgetting passes. With `dry_run` nothing is written; the
/// report lists what would have been removed or demoted.
pub async fn auto_forget(kv: &StateKv, dry_run: bool) -> Result<AutoForgetReport, StoreError> {
    let now = Utc::now();
    let mut report = AutoForgetReport {
        dry_run,
        ..Default::default()
    };

    // ── TTL ──
    let memories: Vec<Memory> = kv.list(scope::MEMORIES).await?;
    let mut expired: HashSet<String> = HashSet::new();
    for memory in &memories {
        let Some(forget_after) = memory.forget_after else {
            continue;
        };
        if now > forget_after {
            report.ttl_expired.push(memory.id.clone());
            expired.insert(memory.id.clone());
            if !dry_run {
                kv.delete(scope::MEMORIES, &memory.id).await?;
            }
        }
    }

    // ── Contradictions ──
    let mut latest: Vec<Memory> = memories
        .into_iter()
        .filter(|m| m.is_latest && !expired.contains(&m.id))
        .collect();
    latest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    latest.truncate(CONTRADICTION_SCAN_LIMIT);

    let lowered: Vec<String> = latest.iter().map(|m| m.content.to_lowercase()).collect();
    let mut demoted: HashSet<usize> = HashSet::new();
    for i in 0..latest.len() {
        for j in (i + 1)..latest.len() {
            let similarity = jaccard_similarity(&lowered[i], &lowered[j]);
            if similarity > CONTRADICTION_THRESHOLD {
                report.contradictions.push(Contradiction {
                    memory_a: latest[i].id.clone(),
                    memory_b: latest[j].id.clone(),
                    similarity,
                });
                let older = if latest[i].created_at < latest[j].created_at {
                    i
                } else {
                    j
                };
                demoted.insert(older);
            }
        }
    }
    if !dry_run {
        for idx in &demoted {
            let mut memory = latest[*idx].clone();
            memory.is_latest = false;
            kv.set(scope::MEMORIES, &memory.id, &memory).await?;
        }
    }

    // ── Low-value observations ──
    let cutoff = now - Duration::days(LOW_VALUE_MAX_AGE_DAYS);
    let sessions: Vec<Session> = kv.list(scope::SESSIONS).await?;
    for session in &sessions {
        let obs_scope = scope::observations(&session.id);
        let observations: Vec<CompressedObservation> = match kv.list(&obs_scope).await {
            Ok(obs) => obs,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "skipping unreadable session");
                continue;
            }
        };
        for obs in observations {
            if obs.timestamp < cutoff && obs.importance <= LOW_VALUE_MAX_IMPORTANCE {
                if !dry_run {
                    if let Err(e) = kv.delete(&obs_scope, &obs.id).await {
                        tracing::warn!(obs_id = %obs.id, error = %e, "failed to delete low-value observation");
                        continue;
                    }
                }
                report.low_value_obs.push(obs.id);
            }
        }
    }

    tracing::info!(
        ttl_expired = report.ttl_expired.len(),
        contradictions = report.contradictions.len(),
        low_value_obs = report.low_value_obs.len(),
        dry_run,
        "auto-forget complete"
    );
    Ok(report)
}
