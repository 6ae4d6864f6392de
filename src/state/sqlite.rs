//! SQLite-backed [`StateStore`].
//!
//! Each call runs on `spawn_blocking` against a shared connection, so the async
//! side never blocks the runtime on disk I/O.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::StateStore;
use crate::error::StoreError;

#[derive(Clone)]
pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = crate::db::open_database(path)?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = crate::db::open_memory_database()?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` with the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let (scope, key) = (scope.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv WHERE scope = ?1 AND key = ?2",
                    params![scope, key],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    async fn set(&self, scope: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let (scope, key) = (scope.to_string(), key.to_string());
        let text = serde_json::to_string(&value)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (scope, key, value, updated_at) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(scope, key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
                params![scope, key, text, chrono::Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, scope: &str, key: &str) -> Result<(), StoreError> {
        let (scope, key) = (scope.to_string(), key.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM kv WHERE scope = ?1 AND key = ?2",
                params![scope, key],
            )?;
            Ok(())
        })
        .await
    }

    async fn list(&self, scope: &str) -> Result<Vec<Value>, StoreError> {
        let scope = scope.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT value FROM kv WHERE scope = ?1 ORDER BY key")?;
            let rows = stmt
                .query_map(params![scope], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut values = Vec::with_capacity(rows.len());
            for text in rows {
                match serde_json::from_str(&text) {
                    Ok(v) => values.push(v),
                    Err(e) => tracing::warn!(scope = %scope, error = %e, "corrupt kv row skipped"),
                }
            }
            Ok(values)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_overwrite_delete() {
        let store = SqliteStateStore::in_memory().unwrap();
        store.set("mem:memories", "m1", json!({"v": 1})).await.unwrap();
        store.set("mem:memories", "m1", json!({"v": 2})).await.unwrap();

        let got = store.get("mem:memories", "m1").await.unwrap();
        assert_eq!(got, Some(json!({"v": 2})));

        store.delete("mem:memories", "m1").await.unwrap();
        assert_eq!(store.get("mem:memories", "m1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_returns_scope_rows_in_key_order() {
        let store = SqliteStateStore::in_memory().unwrap();
        store.set("s", "b", json!("two")).await.unwrap();
        store.set("s", "a", json!("one")).await.unwrap();
        store.set("other", "a", json!("x")).await.unwrap();

        let rows = store.list("s").await.unwrap();
        assert_eq!(rows, vec![json!("one"), json!("two")]);
    }
}
