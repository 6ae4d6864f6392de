//! Short-lived duplicate suppression for incoming tool observations.
//!
//! Hooks can fire the same tool call more than once; a hash seen within the
//! last [`TTL`] is reported as a duplicate. Expired entries are dropped lazily
//! on lookup and by a background sweep every [`SWEEP_INTERVAL`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const TTL: Duration = Duration::from_secs(5 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Characters of tool input that take part in the hash.
pub const INPUT_PREFIX_CHARS: usize = 500;

#[derive(Default)]
pub struct DedupCache {
    /// hash → expiry
    entries: Mutex<HashMap<String, Instant>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// SHA-256 hex of `session:tool:input`, with the input cut to its first
    /// [`INPUT_PREFIX_CHARS`] characters. Strings hash as-is, anything else as JSON.
    pub fn compute_hash(session_id: &str, tool_name: &str, input: &serde_json::Value) -> String {
        let serialized;
        let text = match input {
            serde_json::Value::String(s) => s.as_str(),
            serde_json::Value::Null => "\"\"",
            other => {
                serialized = other.to_string();
                serialized.as_str()
            }
        };
        let prefix = crate::memory::truncate_chars(text, INPUT_PREFIX_CHARS);
        let digest = Sha256::digest(format!("{session_id}:{tool_name}:{prefix}").as_bytes());
        hex::encode(digest)
    }

    pub fn is_duplicate(&self, hash: &str) -> bool {
        let mut entries = self.lock();
        match entries.get(hash).copied() {
            Some(expires_at) if Instant::now() > expires_at => {
                entries.remove(hash);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Insert or refresh `hash` for another [`TTL`].
    pub fn record(&self, hash: &str) {
        self.lock().insert(hash.to_string(), Instant::now() + TTL);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| now <= *expires_at);
        before - entries.len()
    }

    /// Start the periodic sweep. The task holds only a weak reference and ends
    /// on [`stop`](Self::stop) or when the cache is dropped.
    pub fn start(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "dedup sweep");
                }
            }
        });

        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = sweeper.replace(handle) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = sweeper.take() {
            handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DedupCache {
    fn drop(&mut self) {
        self.stop();
    }
}
