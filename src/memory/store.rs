//! Write path for explicitly remembered memories.
//!
//! [`remember`] is the single entry point: validate, normalize the type, derive
//! a title, and write a fresh version-1 record.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::truncate_chars;
use super::types::{Memory, MemoryType};
use crate::error::{ValidationError, WriteError};
use crate::state::{generate_id, scope, StateKv};

/// Titles are the first this-many characters of the content.
pub const TITLE_CHARS: usize = 80;
/// Strength given to memories the user asked to keep.
pub const REMEMBERED_STRENGTH: u8 = 7;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RememberRequest {
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    pub forget_after: Option<DateTime<Utc>>,
}

pub async fn remember(kv: &StateKv, request: RememberRequest) -> Result<Memory, WriteError> {
    if request.content.trim().is_empty() {
        return Err(ValidationError("content is required".into()).into());
    }

    // Unrecognized types are stored as plain facts.
    let memory_type = request
        .memory_type
        .as_deref()
        .and_then(|t| t.parse::<MemoryType>().ok())
        .unwrap_or(MemoryType::Fact);

    let now = Utc::now();
    let memory = Memory {
        id: generate_id("mem"),
        created_at: now,
        updated_at: now,
        memory_type,
        title: truncate_chars(&request.content, TITLE_CHARS).to_string(),
        content: request.content,
        concepts: request.concepts,
        files: request.files,
        session_ids: vec![],
        strength: REMEMBERED_STRENGTH,
        version: 1,
        parent_id: None,
        supersedes: vec![],
        related_ids: vec![],
        is_latest: true,
        forget_after: request.forget_after,
    };
    kv.set(scope::MEMORIES, &memory.id, &memory).await?;

    tracing::info!(memory_id = %memory.id, memory_type = %memory.memory_type, "memory saved");
    Ok(memory)
}
