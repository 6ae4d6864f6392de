//! Debounced snapshotting of the in-process indices into the StateStore.
//!
//! At most one save is pending at a time. `schedule_save` replaces any pending
//! save with a fresh one due after [`DEBOUNCE`]; the generation stamp makes a
//! superseded timer a no-op even if it wakes before it is aborted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::bm25::SearchIndex;
use super::vector::VectorIndex;
use crate::error::StoreError;
use crate::state::{scope, StateKv};

/// Quiet period before a scheduled save fires.
pub const DEBOUNCE: Duration = Duration::from_secs(5);

struct PendingSave {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Result of [`IndexPersistence::load`]; `None` means missing or unreadable.
#[derive(Debug, Default)]
pub struct LoadedIndexes {
    pub bm25: Option<SearchIndex>,
    pub vector: Option<VectorIndex>,
}

pub struct IndexPersistence {
    kv: StateKv,
    bm25: Arc<RwLock<SearchIndex>>,
    vector: Option<Arc<RwLock<VectorIndex>>>,
    generation: AtomicU64,
    pending: Mutex<Option<PendingSave>>,
}

impl IndexPersistence {
    pub fn new(
        kv: StateKv,
        bm25: Arc<RwLock<SearchIndex>>,
        vector: Option<Arc<RwLock<VectorIndex>>>,
    ) -> Self {
        Self {
            kv,
            bm25,
            vector,
            generation: AtomicU64::new(0),
            pending: Mutex::new(None),
        }
    }

    /// Arm (or re-arm) the debounced save. Must be called inside a tokio runtime.
    pub fn schedule_save(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak: Weak<Self> = Arc::downgrade(self);

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            let Some(this) = weak.upgrade() else {
                return;
            };
            {
                let mut slot = this.pending.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.as_ref().map(|p| p.generation) != Some(generation) {
                    return;
                }
                slot.take();
            }
            if let Err(e) = this.write_snapshots().await {
                tracing::warn!(error = %e, "debounced index save failed");
            }
        });
        if let Some(previous) = pending.replace(PendingSave { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Cancel any pending save and write both snapshots now.
    pub async fn save(&self) -> Result<(), StoreError> {
        self.stop();
        self.write_snapshots().await
    }

    /// Cancel a pending save without writing. Callers save explicitly before shutdown.
    pub fn stop(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(p) = pending.take() {
            p.handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn write_snapshots(&self) -> Result<(), StoreError> {
        let bm25_snapshot = self
            .bm25
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .serialize();
        let vector_snapshot = self.vector.as_ref().and_then(|v| {
            let index = v.read().unwrap_or_else(PoisonError::into_inner);
            (!index.is_empty()).then(|| index.serialize())
        });

        self.kv
            .set(scope::INDEX, scope::BM25_KEY, bm25_snapshot)
            .await?;
        if let Some(snapshot) = vector_snapshot {
            self.kv
                .set(scope::INDEX, scope::VECTORS_KEY, snapshot)
                .await?;
        }
        tracing::debug!("index snapshots saved");
        Ok(())
    }

    /// Best-effort restore. Never fails; an unreadable snapshot comes back as `None`.
    pub async fn load(&self) -> LoadedIndexes {
        let bm25 = self
            .load_snapshot(scope::BM25_KEY)
            .await
            .map(|s| SearchIndex::deserialize(&s));
        let vector = self
            .load_snapshot(scope::VECTORS_KEY)
            .await
            .map(|s| VectorIndex::deserialize(&s));

        tracing::info!(
            bm25_docs = bm25.as_ref().map_or(0, SearchIndex::len),
            vectors = vector.as_ref().map_or(0, VectorIndex::len),
            "index snapshots loaded"
        );
        LoadedIndexes { bm25, vector }
    }

    async fn load_snapshot(&self, key: &str) -> Option<String> {
        match self.kv.get::<String>(scope::INDEX, key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "index snapshot unreadable, ignoring");
                None
            }
        }
    }
}

impl Drop for IndexPersistence {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;

    fn persistence() -> (Arc<IndexPersistence>, StateKv, Arc<RwLock<VectorIndex>>) {
        let kv = StateKv::new(Arc::new(MemoryStateStore::new()));
        let bm25 = Arc::new(RwLock::new(SearchIndex::new()));
        let vector = Arc::new(RwLock::new(VectorIndex::new()));
        let p = Arc::new(IndexPersistence::new(
            kv.clone(),
            bm25,
            Some(Arc::clone(&vector)),
        ));
        (p, kv, vector)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_save() {
        let (p, kv, _) = persistence();
        p.schedule_save();
        tokio::time::advance(Duration::from_secs(3)).await;
        p.schedule_save();
        tokio::time::advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;

        // 6s after the first call but only 3s after the second: nothing written.
        let saved: Option<String> = kv.get(scope::INDEX, scope::BM25_KEY).await.unwrap();
        assert!(saved.is_none());
        assert!(p.is_pending());

        tokio::time::advance(Duration::from_secs(3)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let saved: Option<String> = kv.get(scope::INDEX, scope::BM25_KEY).await.unwrap();
        assert!(saved.is_some());
        assert!(!p.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_save() {
        let (p, kv, _) = persistence();
        p.schedule_save();
        p.stop();
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        let saved: Option<String> = kv.get(scope::INDEX, scope::BM25_KEY).await.unwrap();
        assert!(saved.is_none());
    }

    #[tokio::test]
    async fn empty_vector_index_is_not_written() {
        let (p, kv, vector) = persistence();
        p.save().await.unwrap();
        let vectors: Option<String> = kv.get(scope::INDEX, scope::VECTORS_KEY).await.unwrap();
        assert!(vectors.is_none());

        vector.write().unwrap().add("o1", "s1", vec![1.0, 0.0]);
        p.save().await.unwrap();
        let loaded = p.load().await;
        assert_eq!(loaded.vector.map(|v| v.len()), Some(1));
        assert_eq!(loaded.bm25.map(|b| b.len()), Some(0));
    }

    #[tokio::test]
    async fn corrupt_snapshot_loads_as_none() {
        let (p, kv, _) = persistence();
        kv.set(scope::INDEX, scope::BM25_KEY, serde_json::json!({"not": "a string"}))
            .await
            .unwrap();
        let loaded = p.load().await;
        assert!(loaded.bm25.is_none());
        assert!(loaded.vector.is_none());
    }
}
