//! crates/study_assistant_core/src/store.rs
//!
//! JSON records on top of the `KeyValueStore` port, the key scheme, and an
//! in-process store implementation.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::ports::{KeyValueStore, PortError, PortResult};

/// Storage keys. Every record lives under the `study:` prefix.
pub mod keys {
    use uuid::Uuid;

    pub const USERS: &str = "study:users";
    pub const ADMIN_CONFIG: &str = "study:admin_config";

    pub fn history(user_id: Uuid) -> String {
        format!("study:history:{}", user_id)
    }

    pub fn session(instance: &str) -> String {
        format!("study:session:{}", instance)
    }
}

//=========================================================================================
// JsonStore
//=========================================================================================

/// Reads and writes whole JSON-serialized records.
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<dyn KeyValueStore>,
}

impl JsonStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> PortResult<Option<T>> {
        match self.inner.get(key).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                warn!(key, "Stored record failed to parse: {}", e);
                PortError::Corrupt(format!("{}: {}", key, e))
            }),
            None => Ok(None),
        }
    }

    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> PortResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.inner.put(key, &raw).await
    }

    pub async fn delete(&self, key: &str) -> PortResult<()> {
        self.inner.remove(key).await
    }
}

//=========================================================================================
// MemoryStore
//=========================================================================================

/// In-memory key/value store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> PortError {
    PortError::Unexpected("memory store lock poisoned".to_string())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> PortResult<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn json_round_trip() {
        let store = JsonStore::new(Arc::new(MemoryStore::new()));
        let record = Record {
            name: "alpha".to_string(),
            count: 3,
        };
        store.save("k", &record).await.unwrap();
        let loaded: Option<Record> = store.load("k").await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = JsonStore::new(Arc::new(MemoryStore::new()));
        let loaded: Option<Record> = store.load("absent").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn corrupt_value_is_reported() {
        let raw = Arc::new(MemoryStore::new());
        raw.put("k", "{not json").await.unwrap();
        let store = JsonStore::new(raw);
        let err = store.load::<Record>("k").await.unwrap_err();
        assert!(matches!(err, PortError::Corrupt(_)));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let raw = Arc::new(MemoryStore::new());
        let store = JsonStore::new(raw.clone());
        store.save("k", &1u32).await.unwrap();
        assert_eq!(raw.len(), 1);
        store.delete("k").await.unwrap();
        assert!(raw.is_empty());
    }
}
