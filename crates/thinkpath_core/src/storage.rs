//! crates/thinkpath_core/src/storage.rs
//!
//! JSON helpers over the `KeyValueStore` port and a process-lifetime in-memory store.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{TutorError, TutorResult};
use crate::ports::{KeyValueStore, PortResult};

/// Reads and deserializes the value under `key`.
///
/// A missing key is `Ok(None)`. A value that does not parse is
/// `StorageCorruption`, which callers recover from by treating the data as empty.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> TutorResult<Option<T>> {
    let raw = store
        .get(key)
        .await
        .map_err(|e| TutorError::Storage(e.to_string()))?;
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|_| TutorError::StorageCorruption(key.to_string())),
    }
}

/// Serializes `value` and writes it under `key`.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> TutorResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| TutorError::Storage(e.to_string()))?;
    store
        .set(key, &raw)
        .await
        .map_err(|e| TutorError::Storage(e.to_string()))
}

//=========================================================================================
// In-Memory Store
//=========================================================================================

/// A `KeyValueStore` whose contents live only as long as the process.
///
/// Used for the login rate-limit scope, which is meant to be forgotten on restart
/// while the identity vault survives.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
