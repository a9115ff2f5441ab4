//! Persistent-tier storage abstraction.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::error::StoreError;

/// Opaque key→bytes store backing the persistent tier.
///
/// Implementations are local (disk or process memory) and never touch the
/// network. The cache drives a store from a single worker task, so calls for
/// one cache never overlap.
#[async_trait]
pub trait DiskStore: Send + Sync + 'static {
    /// Read the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `bytes` under `key`, replacing any previous value.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every key.
    async fn clear(&self) -> Result<(), StoreError>;

    /// List every stored key.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Make previous writes durable.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Process-local [`DiskStore`]. Nothing survives the process; useful for
/// tests and for caches that only want the memory tier's semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `key` is stored.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DiskStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.lock().clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }
}
