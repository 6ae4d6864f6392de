#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use engram::embedding::EmbeddingProvider;
use engram::error::ProviderError;
use engram::memory::types::{
    CompressedObservation, Memory, MemoryType, ObservationType, Session, SessionStatus,
    SessionSummary,
};
use engram::provider::Compressor;
use engram::state::{scope, MemoryStateStore, StateKv};

/// A typed view over a fresh in-memory store.
pub fn test_kv() -> StateKv {
    StateKv::new(Arc::new(MemoryStateStore::new()))
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// A compressed observation with middling importance and no extras.
pub fn make_obs(id: &str, session_id: &str, title: &str, narrative: &str) -> CompressedObservation {
    CompressedObservation {
        id: id.to_string(),
        session_id: session_id.to_string(),
        timestamp: Utc::now(),
        obs_type: ObservationType::FileEdit,
        title: title.to_string(),
        subtitle: None,
        facts: vec![],
        narrative: narrative.to_string(),
        concepts: vec![],
        files: vec![],
        importance: 5,
    }
}

/// An observation of the given age and importance.
pub fn aged_obs(id: &str, session_id: &str, age_days: i64, importance: u8) -> CompressedObservation {
    CompressedObservation {
        timestamp: days_ago(age_days),
        importance,
        ..make_obs(id, session_id, &format!("observation {id}"), "something happened")
    }
}

pub fn make_memory(id: &str, content: &str) -> Memory {
    let now = Utc::now();
    Memory {
        id: id.to_string(),
        created_at: now,
        updated_at: now,
        memory_type: MemoryType::Pattern,
        title: id.to_string(),
        content: content.to_string(),
        concepts: vec![],
        files: vec![],
        session_ids: vec![],
        strength: 5,
        version: 1,
        parent_id: None,
        supersedes: vec![],
        related_ids: vec![],
        is_latest: true,
        forget_after: None,
    }
}

pub fn make_session(id: &str, project: &str, started_at: DateTime<Utc>) -> Session {
    Session {
        id: id.to_string(),
        project: project.to_string(),
        cwd: format!("/work/{project}"),
        started_at,
        ended_at: None,
        status: SessionStatus::Completed,
        observation_count: 0,
        model: None,
        tags: None,
    }
}

pub fn make_summary(session_id: &str) -> SessionSummary {
    SessionSummary {
        session_id: session_id.to_string(),
        project: "proj".to_string(),
        created_at: Utc::now(),
        title: "summary".to_string(),
        narrative: String::new(),
        key_decisions: vec![],
        files_modified: vec![],
        concepts: vec![],
        observation_count: 0,
    }
}

pub async fn put_memory(kv: &StateKv, memory: &Memory) {
    kv.set(scope::MEMORIES, &memory.id, memory).await.unwrap();
}

pub async fn get_memory(kv: &StateKv, id: &str) -> Option<Memory> {
    kv.get(scope::MEMORIES, id).await.unwrap()
}

pub async fn put_obs(kv: &StateKv, obs: &CompressedObservation) {
    kv.set(&scope::observations(&obs.session_id), &obs.id, obs)
        .await
        .unwrap();
}

pub async fn put_session(kv: &StateKv, session: &Session) {
    kv.set(scope::SESSIONS, &session.id, session).await.unwrap();
}

pub async fn obs_ids(kv: &StateKv, session_id: &str) -> Vec<String> {
    let obs: Vec<CompressedObservation> = kv.list(&scope::observations(session_id)).await.unwrap();
    obs.into_iter().map(|o| o.id).collect()
}

/// An embedder that is configured but always fails.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        8
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::failure("failing", "embedding service unreachable"))
    }
}

/// A compressor whose health can be flipped at run time; counts attempted calls.
pub struct ScriptedCompressor {
    name: String,
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedCompressor {
    pub fn new(name: &str, healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            healthy: AtomicBool::new(healthy),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, kind: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(format!("{kind} by {}", self.name))
        } else {
            Err(ProviderError::failure(&self.name, "HTTP 503"))
        }
    }
}

#[async_trait]
impl Compressor for ScriptedCompressor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compress(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
        self.respond("compressed")
    }

    async fn summarize(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
        self.respond("summarized")
    }
}
