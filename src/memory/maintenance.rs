//! Age- and capacity-based eviction of sessions and observations.
//!
//! Thresholds come from [`EvictionConfig`], with a partial override stored in the
//! StateStore merged on top at run time.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::types::{CompressedObservation, Session, SessionSummary};
use crate::config::EvictionConfig;
use crate::error::StoreError;
use crate::state::{scope, StateKv};

/// Project bucket for sessions that never recorded one.
pub const UNKNOWN_PROJECT: &str = "unknown";

// ── Config override ──────────────────────────────────────────────────────────

/// Partial eviction settings stored at `mem:config` / `eviction`.
/// Present fields win over the configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionOverride {
    pub stale_session_days: Option<i64>,
    pub low_importance_max_days: Option<i64>,
    pub low_importance_threshold: Option<u8>,
    pub max_observations_per_project: Option<usize>,
}

impl EvictionOverride {
    pub fn apply(&self, defaults: &EvictionConfig) -> EvictionConfig {
        EvictionConfig {
            stale_session_days: self.stale_session_days.unwrap_or(defaults.stale_session_days),
            low_importance_max_days: self
                .low_importance_max_days
                .unwrap_or(defaults.low_importance_max_days),
            low_importance_threshold: self
                .low_importance_threshold
                .unwrap_or(defaults.low_importance_threshold),
            max_observations_per_project: self
                .max_observations_per_project
                .unwrap_or(defaults.max_observations_per_project),
        }
    }
}

/// Effective settings: the stored override merged over `defaults`. An unreadable
/// override is ignored.
pub async fn effective_config(kv: &StateKv, defaults: &EvictionConfig) -> EvictionConfig {
    match kv
        .get::<EvictionOverride>(scope::CONFIG, scope::EVICTION_KEY)
        .await
    {
        Ok(Some(o)) => o.apply(defaults),
        Ok(None) => defaults.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "eviction override unreadable, using defaults");
            defaults.clone()
        }
    }
}

// ── Eviction ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionStats {
    pub stale_sessions: usize,
    pub low_importance_obs: usize,
    pub cap_evictions: usize,
    pub dry_run: bool,
}

/// Age- and capacity-based eviction.
///
/// 1. Sessions started longer ago than `stale_session_days` that have no summary.
/// 2. Observations older than `low_importance_max_days` with importance below
///    `low_importance_threshold`.
/// 3. Per project, the lowest-importance observations beyond
///    `max_observations_per_project` (oldest first among equal importance).
pub async fn evict(
    kv: &StateKv,
    defaults: &EvictionConfig,
    dry_run: bool,
) -> Result<EvictionStats, StoreError> {
    let cfg = effective_config(kv, defaults).await;
    let now = Utc::now();
    let mut stats = EvictionStats {
        dry_run,
        ..Default::default()
    };

    let sessions: Vec<Session> = kv.list(scope::SESSIONS).await?;
    let summaries: Vec<SessionSummary> = kv.list(scope::SUMMARIES).await?;
    let summarized: HashSet<&str> = summaries.iter().map(|s| s.session_id.as_str()).collect();

    let stale_cutoff = cutoff(now, cfg.stale_session_days);
    for session in &sessions {
        if is_older(session.started_at, stale_cutoff) && !summarized.contains(session.id.as_str()) {
            stats.stale_sessions += 1;
            if !dry_run {
                delete_logged(kv, scope::SESSIONS, &session.id).await;
            }
        }
    }

    let low_cutoff = cutoff(now, cfg.low_importance_max_days);
    let mut by_project: HashMap<&str, Vec<CompressedObservation>> = HashMap::new();
    for session in &sessions {
        let obs_scope = scope::observations(&session.id);
        let observations: Vec<CompressedObservation> = match kv.list(&obs_scope).await {
            Ok(obs) => obs,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "skipping unreadable session");
                continue;
            }
        };

        let project = if session.project.is_empty() {
            UNKNOWN_PROJECT
        } else {
            session.project.as_str()
        };
        let bucket = by_project.entry(project).or_default();

        for obs in observations.into_iter().filter(|o| !o.title.is_empty()) {
            if is_older(obs.timestamp, low_cutoff) && obs.importance < cfg.low_importance_threshold {
                stats.low_importance_obs += 1;
                if !dry_run {
                    delete_logged(kv, &obs_scope, &obs.id).await;
                }
            } else {
                bucket.push(obs);
            }
        }
    }

    for (project, mut observations) in by_project {
        if observations.len() <= cfg.max_observations_per_project {
            continue;
        }
        let excess = observations.len() - cfg.max_observations_per_project;
        observations.sort_by(|a, b| {
            a.importance
                .cmp(&b.importance)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        stats.cap_evictions += excess;
        tracing::debug!(project, excess, "project over observation cap");
        if !dry_run {
            for obs in observations.iter().take(excess) {
                delete_logged(kv, &scope::observations(&obs.session_id), &obs.id).await;
            }
        }
    }

    tracing::info!(
        stale_sessions = stats.stale_sessions,
        low_importance_obs = stats.low_importance_obs,
        cap_evictions = stats.cap_evictions,
        dry_run,
        "eviction complete"
    );
    Ok(stats)
}

/// `now - days`, or `None` when that falls outside the representable range.
fn cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(days).and_then(|d| now.checked_sub_signed(d))
}

/// Without a cutoff nothing counts as old enough.
fn is_older(at: DateTime<Utc>, cutoff: Option<DateTime<Utc>>) -> bool {
    cutoff.is_some_and(|c| at < c)
}

async fn delete_logged(kv: &StateKv, scope: &str, key: &str) {
    if let Err(e) = kv.delete(scope, key).await {
        tracing::warn!(scope, key, error = %e, "eviction delete failed");
    }
}
