//! The memory relation graph: typed edges, versioning and bounded traversal.
//!
//! Edges live in an append-only registry (`mem:relations`) and are mirrored into
//! each endpoint's `related_ids`. Versioning never edits content in place:
//! [`evolve`] writes a successor and demotes the predecessor.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::types::{Memory, MemoryRelation, RelationType, DEFAULT_RELATION_CONFIDENCE};
use crate::error::{GraphError, StoreError};
use crate::state::{generate_id, scope, StateKv};

/// Hard cap on nodes visited by [`get_related`].
pub const MAX_VISITED: usize = 500;
pub const MAX_HOPS: u32 = 5;
pub const DEFAULT_HOPS: u32 = 2;

const RECENT_DAYS: i64 = 7;
const STALE_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelateOutcome {
    pub relation_id: String,
    pub relation: MemoryRelation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolveOutcome {
    pub memory: Memory,
    pub previous_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedMemory {
    pub memory: Memory,
    pub hop: u32,
    pub confidence: f64,
}

/// Link two memories. Without an explicit `confidence`, one is derived from
/// shared sessions, recency and the relation type.
pub async fn relate(
    kv: &StateKv,
    source_id: &str,
    target_id: &str,
    relation_type: RelationType,
    confidence: Option<f64>,
) -> Result<RelateOutcome, GraphError> {
    let mut source = load_memory(kv, source_id).await?;
    let mut target = load_memory(kv, target_id).await?;

    let confidence = match confidence {
        Some(c) => clamp_confidence(c),
        None => compute_confidence(&source, &target, relation_type, Utc::now()),
    };

    let relation = MemoryRelation {
        relation_type,
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        created_at: Utc::now(),
        confidence: Some(confidence),
    };
    let relation_id = generate_id("rel");
    let relation = kv.set(scope::RELATIONS, &relation_id, relation).await?;

    if !source.related_ids.iter().any(|id| id == target_id) {
        source.related_ids.push(target_id.to_string());
        kv.set(scope::MEMORIES, source_id, &source).await?;
    }
    if !target.related_ids.iter().any(|id| id == source_id) {
        target.related_ids.push(source_id.to_string());
        kv.set(scope::MEMORIES, target_id, &target).await?;
    }

    tracing::info!(
        relation_id = %relation_id,
        relation_type = %relation_type,
        source = source_id,
        target = target_id,
        confidence,
        "memory relation created"
    );
    Ok(RelateOutcome {
        relation_id,
        relation,
    })
}

/// Derived edge confidence, always within `[0, 1]`.
pub fn compute_confidence(
    source: &Memory,
    target: &Memory,
    relation_type: RelationType,
    now: DateTime<Utc>,
) -> f64 {
    let mut confidence = DEFAULT_RELATION_CONFIDENCE;

    let shared = source
        .session_ids
        .iter()
        .filter(|s| target.session_ids.contains(s))
        .collect::<HashSet<_>>()
        .len();
    confidence += (0.1 * shared as f64).min(0.3);

    let age = |m: &Memory| now - m.updated_at;
    let recent = Duration::days(RECENT_DAYS);
    let stale = Duration::days(STALE_DAYS);
    if age(source) <= recent && age(target) <= recent {
        confidence += 0.1;
    } else if age(source) > stale && age(target) > stale {
        confidence -= 0.1;
    }

    match relation_type {
        RelationType::Supersedes => confidence += 0.1,
        RelationType::Contradicts => confidence -= 0.05,
        _ => {}
    }

    clamp_confidence(confidence)
}

fn clamp_confidence(c: f64) -> f64 {
    if c.is_nan() {
        return DEFAULT_RELATION_CONFIDENCE;
    }
    c.clamp(0.0, 1.0)
}

/// Write a new version of `memory_id` and demote the old one.
pub async fn evolve(
    kv: &StateKv,
    memory_id: &str,
    new_content: &str,
    new_title: Option<&str>,
) -> Result<EvolveOutcome, GraphError> {
    let mut existing = load_memory(kv, memory_id).await?;
    let now = Utc::now();

    let mut supersedes = Vec::with_capacity(existing.supersedes.len() + 1);
    supersedes.push(existing.id.clone());
    supersedes.extend(existing.supersedes.iter().cloned());

    let evolved = Memory {
        id: generate_id("mem"),
        created_at: now,
        updated_at: now,
        title: new_title
            .filter(|t| !t.is_empty())
            .map_or_else(|| existing.title.clone(), str::to_string),
        content: new_content.to_string(),
        version: existing.version.max(1) + 1,
        parent_id: Some(existing.id.clone()),
        supersedes,
        is_latest: true,
        ..existing.clone()
    };
    kv.set(scope::MEMORIES, &evolved.id, &evolved).await?;

    existing.is_latest = false;
    kv.set(scope::MEMORIES, &existing.id, &existing).await?;

    let relation = MemoryRelation {
        relation_type: RelationType::Supersedes,
        source_id: evolved.id.clone(),
        target_id: existing.id.clone(),
        created_at: now,
        confidence: Some(1.0),
    };
    kv.set(scope::RELATIONS, &generate_id("rel"), relation).await?;

    tracing::info!(
        old_id = %existing.id,
        new_id = %evolved.id,
        version = evolved.version,
        "memory evolved"
    );
    Ok(EvolveOutcome {
        memory: evolved,
        previous_id: existing.id,
    })
}

/// Breadth-first neighborhood of `memory_id`, best confidence first.
///
/// Follows `related_ids`, the supersedes chain, `parent_id` and registry edges in
/// both directions. A node's confidence is the strongest registry edge joining it
/// to a node visited before it (0.5 when none is recorded), so the value depends
/// on traversal order. Nodes under `min_confidence` are still expanded.
pub async fn get_related(
    kv: &StateKv,
    memory_id: &str,
    max_hops: u32,
    min_confidence: f64,
) -> Result<Vec<RelatedMemory>, StoreError> {
    let max_hops = max_hops.min(MAX_HOPS);
    let min_confidence = if min_confidence.is_nan() {
        0.0
    } else {
        min_confidence.clamp(0.0, 1.0)
    };

    let relations: Vec<MemoryRelation> = kv.list(scope::RELATIONS).await?;
    // node -> [(neighbor, confidence)]
    let mut registry: HashMap<&str, Vec<(&str, f64)>> = HashMap::new();
    for r in &relations {
        let c = r.confidence_or_default();
        registry
            .entry(r.source_id.as_str())
            .or_default()
            .push((r.target_id.as_str(), c));
        registry
            .entry(r.target_id.as_str())
            .or_default()
            .push((r.source_id.as_str(), c));
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut queued: HashSet<String> = HashSet::from([memory_id.to_string()]);
    let mut queue: VecDeque<(String, u32)> = VecDeque::from([(memory_id.to_string(), 0)]);
    let mut results = Vec::new();

    while let Some((id, hop)) = queue.pop_front() {
        if visited.len() >= MAX_VISITED {
            break;
        }

        let confidence = registry
            .get(id.as_str())
            .into_iter()
            .flatten()
            .filter(|(other, _)| visited.contains(*other))
            .map(|(_, c)| *c)
            .fold(None, |best: Option<f64>, c| Some(best.map_or(c, |b| b.max(c))))
            .unwrap_or(DEFAULT_RELATION_CONFIDENCE);
        visited.insert(id.clone());

        let Some(memory) = kv.get::<Memory>(scope::MEMORIES, &id).await? else {
            continue;
        };

        if hop < max_hops {
            let registry_links = registry
                .get(id.as_str())
                .into_iter()
                .flatten()
                .map(|(other, _)| *other);
            let links = memory
                .related_ids
                .iter()
                .chain(memory.supersedes.iter())
                .chain(memory.parent_id.iter())
                .map(String::as_str)
                .chain(registry_links);
            for next in links {
                if !visited.contains(next) && queued.insert(next.to_string()) {
                    queue.push_back((next.to_string(), hop + 1));
                }
            }
        }

        if hop > 0 && confidence >= min_confidence {
            results.push(RelatedMemory {
                memory,
                hop,
                confidence,
            });
        }
    }

    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    tracing::info!(memory_id, found = results.len(), "related memories retrieved");
    Ok(results)
}

async fn load_memory(kv: &StateKv, id: &str) -> Result<Memory, GraphError> {
    kv.get::<Memory>(scope::MEMORIES, id)
        .await?
        .ok_or_else(|| GraphError::NotFound(id.to_string()))
}
