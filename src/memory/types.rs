//! Core record definitions.
//!
//! Defines [`CompressedObservation`] (what the indices consume), [`Memory`]
//! (long-term versioned records), [`MemoryRelation`] (typed, confidence-weighted
//! graph edges), and the session bookkeeping records that eviction reads.
//!
//! All records serialize in camelCase because they share StateStore scopes with
//! the hook adapters that produce them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of agent activity an observation captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    FileRead,
    FileWrite,
    FileEdit,
    CommandRun,
    Search,
    WebFetch,
    Conversation,
    Error,
    Decision,
    Discovery,
    Subagent,
    Notification,
    Task,
    Other,
}

impl ObservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::FileEdit => "file_edit",
            Self::CommandRun => "command_run",
            Self::Search => "search",
            Self::WebFetch => "web_fetch",
            Self::Conversation => "conversation",
            Self::Error => "error",
            Self::Decision => "decision",
            Self::Discovery => "discovery",
            Self::Subagent => "subagent",
            Self::Notification => "notification",
            Self::Task => "task",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ObservationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An observation after upstream compression. Immutable once written;
/// keyed by `(session_id, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedObservation {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub obs_type: ObservationType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    /// 1–10; records written without one are treated as middling.
    #[serde(default = "default_importance")]
    pub importance: u8,
}

fn default_importance() -> u8 {
    5
}

/// Category of a long-term memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Pattern,
    Preference,
    Architecture,
    Bug,
    Workflow,
    Fact,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Preference => "preference",
            Self::Architecture => "architecture",
            Self::Bug => "bug",
            Self::Workflow => "workflow",
            Self::Fact => "fact",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pattern" => Ok(Self::Pattern),
            "preference" => Ok(Self::Preference),
            "architecture" => Ok(Self::Architecture),
            "bug" => Ok(Self::Bug),
            "workflow" => Ok(Self::Workflow),
            "fact" => Ok(Self::Fact),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// A long-term memory record.
///
/// Memories are versioned by superseding: `evolve` writes a new record with
/// `version + 1` and flips the old one's `is_latest`, it never edits content in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub session_ids: Vec<String>,
    /// 1–10.
    #[serde(default = "default_strength")]
    pub strength: u8,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Ids of every earlier version, newest first.
    #[serde(default)]
    pub supersedes: Vec<String>,
    /// Local mirror of registry edges for O(1) neighbor lookup.
    #[serde(default)]
    pub related_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub is_latest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forget_after: Option<DateTime<Utc>>,
}

fn default_strength() -> u8 {
    5
}

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Kind of edge between two memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Supersedes,
    Extends,
    Derives,
    Contradicts,
    Related,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supersedes => "supersedes",
            Self::Extends => "extends",
            Self::Derives => "derives",
            Self::Contradicts => "contradicts",
            Self::Related => "related",
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supersedes" => Ok(Self::Supersedes),
            "extends" => Ok(Self::Extends),
            "derives" => Ok(Self::Derives),
            "contradicts" => Ok(Self::Contradicts),
            "related" => Ok(Self::Related),
            _ => Err(format!("unknown relation type: {s}")),
        }
    }
}

/// Default weight for registry edges written before confidence was tracked.
pub const DEFAULT_RELATION_CONFIDENCE: f64 = 0.5;

/// An entry in the append-only relation registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRelation {
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub source_id: String,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
    /// Clamped to `[0, 1]`. `None` on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl MemoryRelation {
    pub fn confidence_or_default(&self) -> f64 {
        self.confidence.unwrap_or(DEFAULT_RELATION_CONFIDENCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

/// An agent session. Eviction reads `started_at` and `project`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub cwd: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    #[serde(default)]
    pub observation_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// End-of-session summary. A session with a summary is never considered stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub project: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub key_decisions: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub observation_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_round_trips_camel_case() {
        let json = serde_json::json!({
            "id": "obs_1",
            "sessionId": "ses_1",
            "timestamp": "2026-01-05T10:00:00Z",
            "type": "file_edit",
            "title": "Edit auth middleware",
            "facts": ["Added token check"],
            "narrative": "Modified the auth middleware",
            "concepts": ["jwt"],
            "files": ["src/auth.ts"],
            "importance": 7
        });
        let obs: CompressedObservation = serde_json::from_value(json).unwrap();
        assert_eq!(obs.session_id, "ses_1");
        assert_eq!(obs.obs_type, ObservationType::FileEdit);
        assert_eq!(obs.subtitle, None);

        let back = serde_json::to_value(&obs).unwrap();
        assert_eq!(back["type"], "file_edit");
        assert!(back.get("subtitle").is_none());
    }

    #[test]
    fn memory_defaults_for_legacy_records() {
        let json = serde_json::json!({
            "id": "mem_1",
            "createdAt": "2026-01-05T10:00:00Z",
            "updatedAt": "2026-01-05T10:00:00Z",
            "type": "pattern",
            "title": "t",
            "content": "c"
        });
        let mem: Memory = serde_json::from_value(json).unwrap();
        assert_eq!(mem.version, 1);
        assert!(mem.is_latest);
        assert!(mem.supersedes.is_empty());
        assert!(mem.related_ids.is_empty());
    }

    #[test]
    fn relation_without_confidence_defaults() {
        let json = serde_json::json!({
            "type": "related",
            "sourceId": "a",
            "targetId": "b",
            "createdAt": "2026-01-05T10:00:00Z"
        });
        let rel: MemoryRelation = serde_json::from_value(json).unwrap();
        assert_eq!(rel.confidence_or_default(), DEFAULT_RELATION_CONFIDENCE);
        assert_eq!((rel.source_id.as_str(), rel.target_id.as_str()), ("a", "b"));
    }

    #[test]
    fn memory_type_parse() {
        assert_eq!("bug".parse::<MemoryType>().unwrap(), MemoryType::Bug);
        assert!("episodic".parse::<MemoryType>().is_err());
        assert_eq!(
            "contradicts".parse::<RelationType>().unwrap(),
            RelationType::Contradicts
        );
    }
}
