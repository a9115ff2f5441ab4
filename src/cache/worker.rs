//! Persistence worker: the single task that talks to the [`DiskStore`].
//!
//! Every persistent-tier operation is a command on one unbounded channel and
//! is applied in the order it was issued. A read issued after a write, remove
//! or clear therefore always observes it, and callers of `put`/`remove` never
//! wait on disk.
//!
//! Records are stored under `"{namespace}:{key}"`. Clearing and sweeping only
//! touch keys under the worker's own namespace, so several caches can share
//! one store.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::entry::persisted_is_expired;
use super::error::{CacheError, StoreError};
use super::stats::Counters;
use super::store::DiskStore;

/// Separates the namespace from the caller's key in stored keys.
pub(crate) const KEY_SEPARATOR: char = ':';

enum Command {
    Put {
        key: String,
        bytes: Vec<u8>,
    },
    Delete {
        key: String,
    },
    Clear,
    Get {
        key: String,
        reply: oneshot::Sender<Result<Option<Vec<u8>>, StoreError>>,
    },
    Sweep {
        now: SystemTime,
        reply: oneshot::Sender<usize>,
    },
    Flush {
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Sending half of the worker's queue. Dropping every handle stops the worker
/// once the queue drains.
#[derive(Debug, Clone)]
pub(crate) struct PersistenceHandle {
    tx: mpsc::UnboundedSender<Command>,
    namespace: Arc<str>,
}

impl PersistenceHandle {
    /// Spawn the worker on the current tokio runtime.
    pub(crate) fn spawn(
        store: Arc<dyn DiskStore>,
        counters: Arc<Counters>,
        namespace: &str,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let namespace: Arc<str> = Arc::from(namespace);
        let worker = Worker {
            store,
            counters,
            prefix: format!("{namespace}{KEY_SEPARATOR}"),
            namespace: namespace.clone(),
        };
        let join = tokio::spawn(worker.run(rx));
        (Self { tx, namespace }, join)
    }

    pub(crate) fn put(&self, key: String, bytes: Vec<u8>) {
        self.send(Command::Put { key, bytes });
    }

    pub(crate) fn delete(&self, key: String) {
        self.send(Command::Delete { key });
    }

    pub(crate) fn clear(&self) {
        self.send(Command::Clear);
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Get {
                key: key.to_string(),
                reply,
            })
            .map_err(|_| CacheError::WorkerStopped)?;
        Ok(rx.await.map_err(|_| CacheError::WorkerStopped)??)
    }

    /// Delete stale records; resolves to how many were removed.
    pub(crate) async fn sweep(&self, now: SystemTime) -> Result<usize, CacheError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Sweep { now, reply })
            .map_err(|_| CacheError::WorkerStopped)?;
        rx.await.map_err(|_| CacheError::WorkerStopped)
    }

    /// Resolves once every earlier command has been applied and the store flushed.
    pub(crate) async fn flush(&self) -> Result<(), CacheError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush { reply })
            .map_err(|_| CacheError::WorkerStopped)?;
        Ok(rx.await.map_err(|_| CacheError::WorkerStopped)??)
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!(namespace = %self.namespace, "persistence worker stopped, dropping write");
        }
    }
}

struct Worker {
    store: Arc<dyn DiskStore>,
    counters: Arc<Counters>,
    namespace: Arc<str>,
    prefix: String,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.apply(command).await;
        }
        debug!(namespace = %self.namespace, "persistence worker exiting");
    }

    async fn apply(&self, command: Command) {
        match command {
            Command::Put { key, bytes } => {
                if let Err(e) = self.store.put(&self.stored_key(&key), &bytes).await {
                    self.failed("write-through", &key, &e);
                }
            }
            Command::Delete { key } => {
                if let Err(e) = self.store.delete(&self.stored_key(&key)).await {
                    self.failed("delete", &key, &e);
                }
            }
            Command::Clear => self.clear().await,
            Command::Get { key, reply } => {
                let result = self.store.get(&self.stored_key(&key)).await;
                if let Err(e) = &result {
                    self.failed("read", &key, e);
                }
                let _ = reply.send(result);
            }
            Command::Sweep { now, reply } => {
                let removed = self.sweep(now).await;
                let _ = reply.send(removed);
            }
            Command::Flush { reply } => {
                let result = self.store.flush().await;
                if let Err(e) = &result {
                    self.failed("flush", "*", e);
                }
                let _ = reply.send(result);
            }
        }
    }

    fn stored_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Stored keys under this worker's namespace.
    async fn own_keys(&self, op: &'static str) -> Vec<String> {
        match self.store.keys().await {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(&self.prefix))
                .collect(),
            Err(e) => {
                self.failed(op, "*", &e);
                Vec::new()
            }
        }
    }

    async fn clear(&self) {
        for key in self.own_keys("clear").await {
            if let Err(e) = self.store.delete(&key).await {
                self.failed("clear", &key, &e);
            }
        }
    }

    async fn sweep(&self, now: SystemTime) -> usize {
        let keys = self.own_keys("sweep").await;

        let mut removed = 0;
        for key in keys {
            let stale = match self.store.get(&key).await {
                Ok(Some(bytes)) => persisted_is_expired(&bytes, now),
                Ok(None) => false,
                Err(e) => {
                    self.failed("sweep", &key, &e);
                    false
                }
            };
            if !stale {
                continue;
            }
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(e) => self.failed("sweep", &key, &e),
            }
        }
        removed
    }

    fn failed(&self, op: &'static str, key: &str, error: &StoreError) {
        Counters::incr(&self.counters.persistence_failures);
        warn!(
            namespace = %self.namespace,
            op,
            key,
            error = %error,
            "persistent tier operation failed"
        );
    }
}
