//! LMDB-backed persistent tier.
//!
//! Uses the heed crate (Rust bindings for LMDB). A store opens one
//! environment directory and keeps its keys in a named database called after
//! the cache namespace. An environment can only be open once per process, so
//! give each live store its own directory.

use std::path::Path;

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use super::error::StoreError;
use super::store::DiskStore;

/// Named databases one environment can hold.
const MAX_NAMESPACES: u32 = 16;

/// [`DiskStore`] over one named LMDB database.
///
/// ```ignore
/// let store = LmdbStore::open("/var/lib/app/cache", "events", 64)?;
/// let cache = TieredCache::open(config, Arc::new(store)).await?;
/// ```
pub struct LmdbStore {
    env: Env,
    db: Database<Str, Bytes>,
    namespace: String,
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore")
            .field("path", &self.env.path())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl LmdbStore {
    /// Open (creating if needed) the `namespace` database under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn open<P: AsRef<Path>>(
        path: P,
        namespace: &str,
        max_size_mb: usize,
    ) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per store and the directory
        // is not modified by anything outside LMDB while it is mapped.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb.max(1) * 1024 * 1024)
                .max_dbs(MAX_NAMESPACES)
                .open(path.as_ref())
        }
        .map_err(|e| StoreError::Open(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(namespace))
            .map_err(|e| StoreError::Open(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), namespace, "opened lmdb store");

        Ok(Self {
            env,
            db,
            namespace: namespace.to_string(),
        })
    }

    /// The namespace (named database) this store reads and writes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn write<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut heed::RwTxn<'_>) -> heed::Result<()>,
    {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        f(&mut wtxn).map_err(|e| StoreError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl DiskStore for LmdbStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let bytes = self
            .db
            .get(&rtxn, key)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(bytes.map(<[u8]>::to_vec))
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.write(|wtxn| self.db.put(wtxn, key, bytes))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.write(|wtxn| self.db.delete(wtxn, key).map(|_| ()))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.write(|wtxn| self.db.clear(wtxn))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(|e| StoreError::Transaction(e.to_string()))?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.env
            .force_sync()
            .map_err(|e| StoreError::Flush(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store(namespace: &str) -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store =
            LmdbStore::open(temp_dir.path(), namespace, 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (store, _dir) = create_test_store("events");

        store.put("event:1", b"payload").await.unwrap();
        assert_eq!(store.get("event:1").await.unwrap(), Some(b"payload".to_vec()));

        store.delete("event:1").await.unwrap();
        store.delete("event:1").await.unwrap();
        assert_eq!(store.get("event:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_and_clear() {
        let (store, _dir) = create_test_store("events");
        store.put("a", b"1").await.unwrap();
        store.put("b", b"2").await.unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = LmdbStore::open(temp_dir.path(), "profiles", 10).unwrap();
            store.put("user:7", b"ada").await.unwrap();
            store.flush().await.unwrap();
        }

        let reopened = LmdbStore::open(temp_dir.path(), "profiles", 10).unwrap();
        assert_eq!(reopened.get("user:7").await.unwrap(), Some(b"ada".to_vec()));
        assert_eq!(reopened.namespace(), "profiles");
    }
}
