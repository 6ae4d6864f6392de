//! Volatile in-process [`StateStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::StateStore;
use crate::error::StoreError;

/// Scope → ordered key → value, behind a mutex that is never held across an await.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    scopes: Mutex<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored in `scope`.
    pub fn len(&self, scope: &str) -> usize {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.get(scope).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, scope: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(scopes.get(scope).and_then(|s| s.get(key)).cloned())
    }

    async fn set(&self, scope: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, scope: &str, key: &str) -> Result<(), StoreError> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(s) = scopes.get_mut(scope) {
            s.remove(key);
        }
        Ok(())
    }

    async fn list(&self, scope: &str) -> Result<Vec<Value>, StoreError> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(scopes
            .get(scope)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scopes_are_isolated() {
        let store = MemoryStateStore::new();
        store.set("a", "k", json!(1)).await.unwrap();
        store.set("b", "k", json!(2)).await.unwrap();

        assert_eq!(store.get("a", "k").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get("b", "k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.len("a"), 1);

        store.delete("a", "k").await.unwrap();
        assert_eq!(store.get("a", "k").await.unwrap(), None);
        assert_eq!(store.list("b").await.unwrap(), vec![json!(2)]);
    }

    #[tokio::test]
    async fn list_is_key_ordered() {
        let store = MemoryStateStore::new();
        store.set("s", "b", json!("second")).await.unwrap();
        store.set("s", "a", json!("first")).await.unwrap();
        assert_eq!(
            store.list("s").await.unwrap(),
            vec![json!("first"), json!("second")]
        );
        assert!(store.list("missing").await.unwrap().is_empty());
    }
}
