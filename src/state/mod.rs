//! The durable key-value substrate.
//!
//! [`StateStore`] is the storage capability the engine is written against:
//! `get`/`set`/`delete`/`list` by `(scope, key)` over JSON values, so the trait stays
//! object-safe. [`StateKv`] layers typed access on top. Two backends ship with the
//! crate: [`MemoryStateStore`] (volatile, used by tests) and [`SqliteStateStore`].

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

/// Scope names used by the engine. Opaque to the store beyond the string.
pub mod scope {
    pub const SESSIONS: &str = "mem:sessions";
    pub const MEMORIES: &str = "mem:memories";
    pub const SUMMARIES: &str = "mem:summaries";
    pub const CONFIG: &str = "mem:config";
    pub const RELATIONS: &str = "mem:relations";
    /// Holds both index snapshots, under [`BM25_KEY`] and [`VECTORS_KEY`].
    pub const INDEX: &str = "mem:index:bm25";
    pub const BM25_KEY: &str = "data";
    pub const VECTORS_KEY: &str = "vectors";
    /// Key of the eviction override record inside [`CONFIG`].
    pub const EVICTION_KEY: &str = "eviction";

    /// Per-session observation list.
    pub fn observations(session_id: &str) -> String {
        format!("mem:obs:{session_id}")
    }
}

/// Asynchronous, fallible key-value storage by `(scope, key)`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, scope: &str, key: &str, value: Value) -> Result<(), StoreError>;

    async fn delete(&self, scope: &str, key: &str) -> Result<(), StoreError>;

    /// All values in `scope`, in key order.
    async fn list(&self, scope: &str) -> Result<Vec<Value>, StoreError>;
}

/// Typed façade over a shared [`StateStore`].
#[derive(Clone)]
pub struct StateKv {
    store: Arc<dyn StateStore>,
}

impl StateKv {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.store.get(scope, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Write `value` and hand it back.
    pub async fn set<T: Serialize>(&self, scope: &str, key: &str, value: T) -> Result<T, StoreError> {
        let json = serde_json::to_value(&value)?;
        self.store.set(scope, key, json).await?;
        Ok(value)
    }

    pub async fn delete(&self, scope: &str, key: &str) -> Result<(), StoreError> {
        self.store.delete(scope, key).await
    }

    /// List a scope, skipping rows that are not a `T` (e.g. raw observations
    /// that have not been compressed yet).
    pub async fn list<T: DeserializeOwned>(&self, scope: &str) -> Result<Vec<T>, StoreError> {
        let rows = self.store.list(scope).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value(row) {
                Ok(item) => out.push(item),
                Err(e) => tracing::debug!(scope, error = %e, "skipping row of unexpected shape"),
            }
        }
        Ok(out)
    }
}

/// Generate a time-sortable id such as `mem_0190f3c2...`.
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: String,
        n: u32,
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let kv = StateKv::new(Arc::new(MemoryStateStore::new()));
        let row = kv
            .set("s", "a", Row { id: "a".into(), n: 1 })
            .await
            .unwrap();
        assert_eq!(row.n, 1);

        let got: Option<Row> = kv.get("s", "a").await.unwrap();
        assert_eq!(got, Some(Row { id: "a".into(), n: 1 }));

        kv.delete("s", "a").await.unwrap();
        let gone: Option<Row> = kv.get("s", "a").await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn list_skips_foreign_rows() {
        let store = Arc::new(MemoryStateStore::new());
        store
            .set("s", "a", serde_json::json!({"id": "a", "n": 1}))
            .await
            .unwrap();
        store
            .set("s", "b", serde_json::json!({"raw": true}))
            .await
            .unwrap();
        let kv = StateKv::new(store);
        let rows: Vec<Row> = kv.list("s").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
    }

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = generate_id("rel");
        let b = generate_id("rel");
        assert!(a.starts_with("rel_"));
        assert_ne!(a, b);
    }

    #[test]
    fn observation_scope_is_per_session() {
        assert_eq!(scope::observations("ses_1"), "mem:obs:ses_1");
    }
}
