//! Whole-store export and import.
//!
//! An export is a single JSON document holding every session, compressed
//! observation, memory, summary and relation. Imports are validated in full
//! before the first write, so a rejected payload leaves the store untouched.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{CompressedObservation, Memory, MemoryRelation, Session, SessionSummary};
use crate::error::{StoreError, ValidationError, WriteError};
use crate::state::{generate_id, scope, StateKv};

pub const EXPORT_VERSION: &str = "0.3.0";

pub const MAX_SESSIONS: usize = 10_000;
pub const MAX_MEMORIES: usize = 50_000;
pub const MAX_SUMMARIES: usize = 10_000;
pub const MAX_OBS_PER_SESSION: usize = 5_000;
pub const MAX_TOTAL_OBSERVATIONS: usize = 500_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub sessions: Vec<Session>,
    /// Session id → its compressed observations.
    pub observations: BTreeMap<String, Vec<CompressedObservation>>,
    pub memories: Vec<Memory>,
    pub summaries: Vec<SessionSummary>,
    #[serde(default)]
    pub relations: Vec<MemoryRelation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStrategy {
    /// Overwrite records that already exist.
    #[default]
    Merge,
    /// Clear sessions, observations, memories and summaries first.
    Replace,
    /// Keep records that already exist.
    Skip,
}

impl std::str::FromStr for ImportStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "replace" => Ok(Self::Replace),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("unknown import strategy: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportStats {
    pub sessions: usize,
    pub observations: usize,
    pub memories: usize,
    pub summaries: usize,
    pub relations: usize,
    pub skipped: usize,
}

pub async fn export(kv: &StateKv) -> Result<ExportData, StoreError> {
    let sessions: Vec<Session> = kv.list(scope::SESSIONS).await?;
    let memories: Vec<Memory> = kv.list(scope::MEMORIES).await?;
    let summaries: Vec<SessionSummary> = kv.list(scope::SUMMARIES).await?;
    let relations: Vec<MemoryRelation> = kv.list(scope::RELATIONS).await?;

    let mut observations = BTreeMap::new();
    for session in &sessions {
        let obs: Vec<CompressedObservation> = kv.list(&scope::observations(&session.id)).await?;
        if !obs.is_empty() {
            observations.insert(session.id.clone(), obs);
        }
    }

    let total_obs: usize = observations.values().map(Vec::len).sum();
    tracing::info!(
        sessions = sessions.len(),
        observations = total_obs,
        memories = memories.len(),
        summaries = summaries.len(),
        relations = relations.len(),
        "export complete"
    );

    Ok(ExportData {
        version: EXPORT_VERSION.to_string(),
        exported_at: Utc::now(),
        sessions,
        observations,
        memories,
        summaries,
        relations,
    })
}

/// Check version and size limits. Runs before any mutation.
pub fn validate(data: &ExportData) -> Result<(), ValidationError> {
    if data.version != EXPORT_VERSION {
        return Err(ValidationError(format!(
            "unsupported export version: {}",
            data.version
        )));
    }
    if data.sessions.len() > MAX_SESSIONS {
        return Err(ValidationError(format!("too many sessions (max {MAX_SESSIONS})")));
    }
    if data.memories.len() > MAX_MEMORIES {
        return Err(ValidationError(format!("too many memories (max {MAX_MEMORIES})")));
    }
    if data.summaries.len() > MAX_SUMMARIES {
        return Err(ValidationError(format!("too many summaries (max {MAX_SUMMARIES})")));
    }
    let mut total = 0usize;
    for obs in data.observations.values() {
        if obs.len() > MAX_OBS_PER_SESSION {
            return Err(ValidationError(format!(
                "too many observations per session (max {MAX_OBS_PER_SESSION})"
            )));
        }
        total += obs.len();
    }
    if total > MAX_TOTAL_OBSERVATIONS {
        return Err(ValidationError(format!(
            "too many total observations (max {MAX_TOTAL_OBSERVATIONS})"
        )));
    }
    Ok(())
}

pub async fn import(
    kv: &StateKv,
    data: &ExportData,
    strategy: ImportStrategy,
) -> Result<ImportStats, WriteError> {
    validate(data)?;
    let mut stats = ImportStats::default();

    if strategy == ImportStrategy::Replace {
        clear_existing(kv).await?;
    }
    let skip = strategy == ImportStrategy::Skip;

    for session in &data.sessions {
        if skip && exists::<Session>(kv, scope::SESSIONS, &session.id).await? {
            stats.skipped += 1;
            continue;
        }
        kv.set(scope::SESSIONS, &session.id, session).await?;
        stats.sessions += 1;
    }

    for (session_id, observations) in &data.observations {
        let obs_scope = scope::observations(session_id);
        for obs in observations {
            if skip && exists::<CompressedObservation>(kv, &obs_scope, &obs.id).await? {
                stats.skipped += 1;
                continue;
            }
            kv.set(&obs_scope, &obs.id, obs).await?;
            stats.observations += 1;
        }
    }

    for memory in &data.memories {
        if skip && exists::<Memory>(kv, scope::MEMORIES, &memory.id).await? {
            stats.skipped += 1;
            continue;
        }
        kv.set(scope::MEMORIES, &memory.id, memory).await?;
        stats.memories += 1;
    }

    for summary in &data.summaries {
        if skip && exists::<SessionSummary>(kv, scope::SUMMARIES, &summary.session_id).await? {
            stats.skipped += 1;
            continue;
        }
        kv.set(scope::SUMMARIES, &summary.session_id, summary).await?;
        stats.summaries += 1;
    }

    // Registry keys are not exported; identical edges are not appended twice.
    let existing: Vec<MemoryRelation> = kv.list(scope::RELATIONS).await?;
    let mut seen: HashSet<String> = existing.iter().map(relation_fingerprint).collect();
    for relation in &data.relations {
        if !seen.insert(relation_fingerprint(relation)) {
            stats.skipped += 1;
            continue;
        }
        kv.set(scope::RELATIONS, &generate_id("rel"), relation).await?;
        stats.relations += 1;
    }

    tracing::info!(
        strategy = ?strategy,
        sessions = stats.sessions,
        observations = stats.observations,
        memories = stats.memories,
        summaries = stats.summaries,
        relations = stats.relations,
        skipped = stats.skipped,
        "import complete"
    );
    Ok(stats)
}

async fn exists<T: serde::de::DeserializeOwned>(
    kv: &StateKv,
    scope: &str,
    key: &str,
) -> Result<bool, StoreError> {
    Ok(kv.get::<T>(scope, key).await?.is_some())
}

async fn clear_existing(kv: &StateKv) -> Result<(), StoreError> {
    let sessions: Vec<Session> = kv.list(scope::SESSIONS).await?;
    for session in &sessions {
        kv.delete(scope::SESSIONS, &session.id).await?;
        let obs_scope = scope::observations(&session.id);
        let observations: Vec<CompressedObservation> = kv.list(&obs_scope).await?;
        for obs in &observations {
            kv.delete(&obs_scope, &obs.id).await?;
        }
    }
    let memories: Vec<Memory> = kv.list(scope::MEMORIES).await?;
    for memory in &memories {
        kv.delete(scope::MEMORIES, &memory.id).await?;
    }
    let summaries: Vec<SessionSummary> = kv.list(scope::SUMMARIES).await?;
    for summary in &summaries {
        kv.delete(scope::SUMMARIES, &summary.session_id).await?;
    }
    Ok(())
}

fn relation_fingerprint(r: &MemoryRelation) -> String {
    format!(
        "{}|{}|{}|{}",
        r.relation_type,
        r.source_id,
        r.target_id,
        r.created_at.timestamp_millis()
    )
}
