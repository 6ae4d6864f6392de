//! The startup-owned engine instance.
//!
//! [`Engine::open`] builds every shared structure once (indices, hybrid search,
//! persistence, dedup cache) and hands out one handle for the lifetime of the
//! process. [`Engine::shutdown`] performs the final index save.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{EngramConfig, EvictionConfig};
use crate::dedup::DedupCache;
use crate::embedding::EmbeddingProvider;
use crate::error::{GraphError, StoreError, WriteError};
use crate::index::{HybridSearch, HybridSearchResult, IndexPersistence, SearchIndex, VectorIndex};
use crate::memory::forget::{AutoForgetReport, ForgetOutcome, ForgetRequest};
use crate::memory::maintenance::EvictionStats;
use crate::memory::relations::{EvolveOutcome, RelateOutcome, RelatedMemory};
use crate::memory::store::RememberRequest;
use crate::memory::transfer::{ExportData, ImportStats, ImportStrategy};
use crate::memory::types::{CompressedObservation, Memory, RelationType, Session};
use crate::memory::{forget, maintenance, relations, store, transfer};
use crate::state::{scope, StateKv, StateStore};

pub struct Engine {
    kv: StateKv,
    bm25: Arc<RwLock<SearchIndex>>,
    vector: Option<Arc<RwLock<VectorIndex>>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    hybrid: HybridSearch,
    persistence: Arc<IndexPersistence>,
    dedup: Arc<DedupCache>,
    eviction_defaults: EvictionConfig,
    default_limit: usize,
}

impl Engine {
    /// Wire the engine over `store`, restoring persisted indices. An empty BM25
    /// index, or an empty vector index while an embedder is configured, is
    /// rebuilt from the stored observations. A failed rebuild is logged and the
    /// engine opens with whatever was restored.
    pub async fn open(
        store: Arc<dyn StateStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: &EngramConfig,
    ) -> Result<Self, StoreError> {
        let kv = StateKv::new(store);
        let bm25 = Arc::new(RwLock::new(SearchIndex::new()));
        let vector = embedder
            .as_ref()
            .map(|_| Arc::new(RwLock::new(VectorIndex::new())));

        let persistence = Arc::new(IndexPersistence::new(
            kv.clone(),
            Arc::clone(&bm25),
            vector.clone(),
        ));
        let loaded = persistence.load().await;
        if let Some(restored) = loaded.bm25 {
            *bm25.write().unwrap_or_else(PoisonError::into_inner) = restored;
        }
        if let (Some(slot), Some(restored)) = (&vector, loaded.vector) {
            *slot.write().unwrap_or_else(PoisonError::into_inner) = restored;
        }

        let (bm25_weight, vector_weight) = config.search.effective_weights();
        let hybrid = HybridSearch::new(
            Arc::clone(&bm25),
            vector.clone(),
            embedder.clone(),
            kv.clone(),
        )
        .with_weights(bm25_weight, vector_weight);

        let dedup = Arc::new(DedupCache::new());
        dedup.start();

        let engine = Self {
            kv,
            bm25,
            vector,
            embedder,
            hybrid,
            persistence,
            dedup,
            eviction_defaults: config.eviction.clone(),
            default_limit: config.search.default_limit.max(1),
        };

        let vector_missing = engine.embedder.is_some() && engine.vector_size() == 0;
        if engine.index_size() == 0 || vector_missing {
            match engine.rebuild_index().await {
                Ok(count) => tracing::info!(count, "search index rebuilt from store"),
                Err(e) => tracing::warn!(
                    error = %e,
                    "search index rebuild failed, continuing with restored index"
                ),
            }
        }

        tracing::info!(
            bm25_docs = engine.index_size(),
            vector = engine.embedder.as_ref().map(|e| e.name()).unwrap_or("none"),
            "engine ready"
        );
        Ok(engine)
    }

    pub fn kv(&self) -> &StateKv {
        &self.kv
    }

    pub fn index_size(&self) -> usize {
        self.bm25.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn vector_size(&self) -> usize {
        self.vector
            .as_ref()
            .map(|v| v.read().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    /// Store a compressed observation and index it. Embedding failures leave the
    /// observation keyword-searchable only.
    pub async fn ingest(&self, obs: CompressedObservation) -> Result<(), StoreError> {
        self.kv
            .set(&scope::observations(&obs.session_id), &obs.id, &obs)
            .await?;

        self.bm25
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(&obs);
        self.embed_into_vector_index(&obs).await;

        if let Some(mut session) = self
            .kv
            .get::<Session>(scope::SESSIONS, &obs.session_id)
            .await?
        {
            session.observation_count += 1;
            self.kv
                .set(scope::SESSIONS, &obs.session_id, &session)
                .await?;
        }

        self.persistence.schedule_save();
        tracing::debug!(obs_id = %obs.id, session_id = %obs.session_id, "observation ingested");
        Ok(())
    }

    async fn embed_into_vector_index(&self, obs: &CompressedObservation) {
        let (Some(vector), Some(embedder)) = (&self.vector, &self.embedder) else {
            return;
        };
        let text = format!("{} {}", obs.title, obs.narrative);
        match embedder.embed(&text).await {
            Ok(embedding) => {
                let mut index = vector.write().unwrap_or_else(PoisonError::into_inner);
                index.add(&obs.id, &obs.session_id, embedding);
            }
            Err(e) => {
                tracing::warn!(obs_id = %obs.id, error = %e, "embedding failed, observation indexed for keywords only");
            }
        }
    }

    /// `true` if the same tool call was already seen recently; otherwise the
    /// call is recorded and `false` is returned.
    pub fn check_duplicate(&self, session_id: &str, tool_name: &str, input: &serde_json::Value) -> bool {
        let hash = DedupCache::compute_hash(session_id, tool_name, input);
        if self.dedup.is_duplicate(&hash) {
            return true;
        }
        self.dedup.record(&hash);
        false
    }

    /// Clear the keyword index and re-add every stored observation that has
    /// a title and narrative. Observations missing from the vector index are
    /// embedded as well. Returns the number indexed.
    ///
    /// Sessions are taken from the session records plus any session already
    /// referenced by the keyword index, so observations ingested without a
    /// session record survive a rebuild.
    pub async fn rebuild_index(&self) -> Result<usize, StoreError> {
        let sessions: Vec<Session> = self.kv.list(scope::SESSIONS).await?;
        let mut session_ids: BTreeSet<String> = sessions.into_iter().map(|s| s.id).collect();
        session_ids.extend(
            self.bm25
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .documents()
                .into_iter()
                .map(|(_, session_id)| session_id),
        );

        let mut observations = Vec::new();
        for session_id in &session_ids {
            let obs: Vec<CompressedObservation> =
                self.kv.list(&scope::observations(session_id)).await?;
            observations.extend(
                obs.into_iter()
                    .filter(|o| !o.title.is_empty() && !o.narrative.is_empty()),
            );
        }

        {
            let mut index = self.bm25.write().unwrap_or_else(PoisonError::into_inner);
            index.clear();
            for obs in &observations {
                index.add(obs);
            }
        }

        if let Some(vector) = &self.vector {
            for obs in &observations {
                let missing = !vector
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(&obs.id);
                if missing {
                    self.embed_into_vector_index(obs).await;
                }
            }
        }

        if !observations.is_empty() {
            self.persistence.schedule_save();
        }
        Ok(observations.len())
    }

    /// Drop index entries whose observation record no longer exists in the
    /// store. Returns the number of distinct observations removed.
    pub async fn prune_indices(&self) -> Result<usize, StoreError> {
        let mut indexed = self
            .bm25
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .documents();
        if let Some(vector) = &self.vector {
            indexed.extend(vector.read().unwrap_or_else(PoisonError::into_inner).documents());
        }
        indexed.sort();
        indexed.dedup();

        let mut stale = Vec::new();
        for (obs_id, session_id) in indexed {
            let record: Option<serde_json::Value> =
                self.kv.get(&scope::observations(&session_id), &obs_id).await?;
            if record.is_none() {
                stale.push(obs_id);
            }
        }
        if stale.is_empty() {
            return Ok(0);
        }

        {
            let mut index = self.bm25.write().unwrap_or_else(PoisonError::into_inner);
            for obs_id in &stale {
                index.remove(obs_id);
            }
        }
        if let Some(vector) = &self.vector {
            let mut index = vector.write().unwrap_or_else(PoisonError::into_inner);
            for obs_id in &stale {
                index.remove(obs_id);
            }
        }

        stale.sort();
        stale.dedup();
        self.persistence.schedule_save();
        tracing::debug!(removed = stale.len(), "pruned deleted observations from search indices");
        Ok(stale.len())
    }

    // ── Retrieval ────────────────────────────────────────────────────────────

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<HybridSearchResult> {
        self.hybrid
            .search(query, limit.unwrap_or(self.default_limit))
            .await
    }

    // ── Memories and the relation graph ──────────────────────────────────────

    pub async fn remember(&self, request: RememberRequest) -> Result<Memory, WriteError> {
        store::remember(&self.kv, request).await
    }

    /// Delete the requested records and drop deleted observations from the
    /// search indices.
    pub async fn forget(&self, request: &ForgetRequest) -> Result<ForgetOutcome, StoreError> {
        let outcome = forget::forget(&self.kv, request).await?;
        self.prune_indices().await?;
        Ok(outcome)
    }

    pub async fn relate(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
        confidence: Option<f64>,
    ) -> Result<RelateOutcome, GraphError> {
        relations::relate(&self.kv, source_id, target_id, relation_type, confidence).await
    }

    pub async fn evolve(
        &self,
        memory_id: &str,
        new_content: &str,
        new_title: Option<&str>,
    ) -> Result<EvolveOutcome, GraphError> {
        relations::evolve(&self.kv, memory_id, new_content, new_title).await
    }

    pub async fn get_related(
        &self,
        memory_id: &str,
        max_hops: u32,
        min_confidence: f64,
    ) -> Result<Vec<RelatedMemory>, StoreError> {
        relations::get_related(&self.kv, memory_id, max_hops, min_confidence).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub async fn auto_forget(&self, dry_run: bool) -> Result<AutoForgetReport, StoreError> {
        let report = forget::auto_forget(&self.kv, dry_run).await?;
        if !dry_run {
            self.prune_indices().await?;
        }
        Ok(report)
    }

    pub async fn evict(&self, dry_run: bool) -> Result<EvictionStats, StoreError> {
        let stats = maintenance::evict(&self.kv, &self.eviction_defaults, dry_run).await?;
        if !dry_run {
            self.prune_indices().await?;
        }
        Ok(stats)
    }

    pub async fn export(&self) -> Result<ExportData, StoreError> {
        transfer::export(&self.kv).await
    }

    /// Import an export document, then rebuild the keyword index so imported
    /// observations are searchable.
    pub async fn import(
        &self,
        data: &ExportData,
        strategy: ImportStrategy,
    ) -> Result<ImportStats, WriteError> {
        let stats = transfer::import(&self.kv, data, strategy).await?;
        self.rebuild_index().await?;
        Ok(stats)
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────

    /// Stop background work and write the final index snapshots.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.dedup.stop();
        self.persistence.save().await?;
        tracing::info!("engine shut down");
        Ok(())
    }
}
