//! The two-tier cache.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::entry::{CacheEntry, CacheOptions};
use super::error::CacheError;
use super::memory::{Lookup, MemoryTier};
use super::stats::{CacheStats, Counters};
use super::store::DiskStore;
use super::worker::PersistenceHandle;
use crate::clock::{Clock, SystemClock};

/// What one expiration sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries dropped from the in-memory tier.
    pub memory: usize,
    /// Records dropped from the persistent tier.
    pub persistent: usize,
}

/// Key→value cache with a bounded in-memory tier in front of a persistent
/// tier.
///
/// Writes land in memory immediately and are written through to the
/// [`DiskStore`] by a background worker. Reads are served from memory; a
/// memory miss falls back to one persistent read and promotes what it finds.
/// When memory is full the entry with the lowest
/// `(priority, last_accessed_at)` is evicted from both tiers.
///
/// Persistence failures are logged and counted in [`CacheStats`] but never
/// returned from `put`, `get`, `remove` or `clear_all`.
///
/// ```rust
/// use holdfast::cache::{CacheConfig, CacheOptions, MemoryStore, Priority, TieredCache};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let cache: TieredCache<String> =
///     TieredCache::open(CacheConfig::new().with_namespace("docs"), Arc::new(MemoryStore::new()))
///         .await
///         .unwrap();
///
/// cache.put(
///     "greeting",
///     "hello".to_string(),
///     CacheOptions::ttl(Duration::from_secs(60)).with_priority(Priority::High),
/// );
/// assert_eq!(cache.get("greeting").await, Some("hello".to_string()));
///
/// cache.close().await.unwrap();
/// # });
/// ```
#[derive(Debug)]
pub struct TieredCache<V> {
    inner: Arc<Inner<V>>,
    sweeper: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner<V> {
    memory: Mutex<MemoryTier<V>>,
    persistence: PersistenceHandle,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
}

impl<V> TieredCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open a cache over `store` using the system clock.
    ///
    /// Must be called inside a tokio runtime: it spawns the persistence
    /// worker and, if `sweep_interval` is set, the background sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidConfig`] if `config` fails validation.
    pub async fn open(config: CacheConfig, store: Arc<dyn DiskStore>) -> Result<Self, CacheError> {
        Self::with_clock(config, store, Arc::new(SystemClock)).await
    }

    /// Open a cache that reads wall-clock time from `clock`.
    pub async fn with_clock(
        config: CacheConfig,
        store: Arc<dyn DiskStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        let counters = Arc::new(Counters::default());
        let (persistence, _worker) =
            PersistenceHandle::spawn(store, counters.clone(), &config.namespace);

        let sweep_interval = config.sweep_interval;
        let inner = Arc::new(Inner {
            memory: Mutex::new(MemoryTier::default()),
            persistence,
            config,
            clock,
            counters,
        });
        let sweeper = sweep_interval.map(|period| spawn_sweeper(Arc::downgrade(&inner), period));

        info!(
            namespace = %inner.config.namespace,
            max_entries = inner.config.max_entries,
            sweep_interval_ms = sweep_interval.map(|d| d.as_millis() as u64),
            "tiered cache opened"
        );

        Ok(Self { inner, sweeper })
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// If memory is full and `key` is new, stale entries are purged first and
    /// then the lowest-ranked entries are evicted until there is room.
    pub fn put(&self, key: impl Into<String>, value: V, options: CacheOptions) {
        let key = key.into();
        let inner = &*self.inner;
        let now = inner.clock.now();
        let entry = CacheEntry::new(key.clone(), value, now, options.ttl, options.priority);

        let bytes = match entry.encode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                Counters::incr(&inner.counters.persistence_failures);
                warn!(
                    namespace = %inner.config.namespace,
                    key = %key,
                    error = %e,
                    "failed to encode entry, keeping it in memory only"
                );
                None
            }
        };

        let mut memory = inner.memory();
        inner.make_room(&mut memory, &key, now);
        memory.insert(entry);
        // Enqueued under the lock so disk order matches memory order.
        match bytes {
            Some(bytes) => inner.persistence.put(key, bytes),
            None => inner.persistence.delete(key),
        }
    }

    /// [`put`](Self::put) with the configured default TTL and priority.
    pub fn put_default(&self, key: impl Into<String>, value: V) {
        let options = CacheOptions::ttl(self.inner.config.default_ttl)
            .with_priority(self.inner.config.default_priority);
        self.put(key, value, options);
    }

    /// Read a fresh value.
    ///
    /// Returns a clone of the cached value. A memory miss reads the persistent
    /// tier once (when `rehydrate_on_miss` is set) and promotes a fresh record
    /// into memory. Stale records are deleted and count as a miss. A record
    /// that does not decode as `V` is left in place and also counts as a miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        let inner = &*self.inner;
        let now = inner.clock.now();

        let generation = {
            let mut memory = inner.memory();
            match memory.lookup(key, now) {
                Lookup::Hit(value) => return Some(inner.hit(key, value)),
                Lookup::Expired => {
                    inner.persistence.delete(key.to_string());
                    Counters::incr(&inner.counters.expirations);
                    debug!(namespace = %inner.config.namespace, key, "entry expired");
                    return inner.miss(key);
                }
                Lookup::Missing => memory.generation(),
            }
        };

        if !inner.config.rehydrate_on_miss {
            return inner.miss(key);
        }

        let bytes = match inner.persistence.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return inner.miss(key),
            Err(e) => {
                debug!(
                    namespace = %inner.config.namespace,
                    key,
                    error = %e,
                    "persistent read failed"
                );
                return inner.miss(key);
            }
        };

        let now = inner.clock.now();
        let entry = match CacheEntry::<V>::decode(key, &bytes, now) {
            Ok(entry) if !entry.is_expired(now) => entry,
            Ok(_) => {
                let memory = inner.memory();
                // A write issued during the read must not be deleted.
                if memory.generation() == generation {
                    inner.persistence.delete(key.to_string());
                }
                drop(memory);
                Counters::incr(&inner.counters.expirations);
                debug!(namespace = %inner.config.namespace, key, "persisted entry expired");
                return inner.miss(key);
            }
            Err(e) => {
                warn!(
                    namespace = %inner.config.namespace,
                    key,
                    error = %e,
                    "ignoring undecodable persisted entry"
                );
                return inner.miss(key);
            }
        };

        let mut memory = inner.memory();
        if memory.generation() != generation {
            // Memory changed during the disk read; it is the newer source.
            return match memory.lookup(key, now) {
                Lookup::Hit(value) => Some(inner.hit(key, value)),
                Lookup::Expired => {
                    inner.persistence.delete(key.to_string());
                    Counters::incr(&inner.counters.expirations);
                    inner.miss(key)
                }
                Lookup::Missing => Some(inner.hit(key, entry.value)),
            };
        }

        let value = entry.value.clone();
        inner.make_room(&mut memory, key, now);
        memory.insert(entry);
        drop(memory);

        Counters::incr(&inner.counters.rehydrations);
        debug!(namespace = %inner.config.namespace, key, "rehydrated entry from persistent tier");
        Some(inner.hit(key, value))
    }

    /// Remove `key` from both tiers. Removing an absent key is a no-op.
    pub fn remove(&self, key: &str) {
        let inner = &*self.inner;
        let mut memory = inner.memory();
        memory.remove(key);
        inner.persistence.delete(key.to_string());
    }

    /// Remove every entry from both tiers.
    pub fn clear_all(&self) {
        let inner = &*self.inner;
        let mut memory = inner.memory();
        memory.clear();
        inner.persistence.clear();
        debug!(namespace = %inner.config.namespace, "cache cleared");
    }

    /// Purge stale entries from both tiers now.
    ///
    /// The background sweeper calls this every `sweep_interval`.
    pub async fn sweep_expired(&self) -> SweepReport {
        self.inner.sweep().await
    }

    /// Whether a fresh entry for `key` is in memory. Does not consult the
    /// persistent tier or touch recency.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.memory().contains_fresh(key, self.inner.clock.now())
    }

    /// Entries currently held in memory, stale or not.
    pub fn len(&self) -> usize {
        self.inner.memory().len()
    }

    /// Whether the in-memory tier is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot(self.len())
    }

    /// The configuration this cache was opened with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Wait for all queued persistence work, then flush the store.
    pub async fn flush(&self) -> Result<(), CacheError> {
        self.inner.persistence.flush().await
    }

    /// Stop the sweeper and flush. The persistence worker exits once the
    /// cache is dropped.
    pub async fn close(mut self) -> Result<(), CacheError> {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
            let _ = sweeper.await;
        }
        self.flush().await?;
        debug!(namespace = %self.inner.config.namespace, "tiered cache closed");
        Ok(())
    }
}

impl<V> Drop for TieredCache<V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl<V> Inner<V> {
    fn memory(&self) -> MutexGuard<'_, MemoryTier<V>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make room for `key` if it is new and memory is full.
    fn make_room(&self, memory: &mut MemoryTier<V>, key: &str, now: SystemTime) {
        let max = self.config.max_entries;
        if memory.contains(key) || memory.len() < max {
            return;
        }

        for stale in memory.purge_expired(now) {
            Counters::incr(&self.counters.expirations);
            self.persistence.delete(stale);
        }

        while memory.len() >= max {
            let Some(victim) = memory.evict_one() else {
                break;
            };
            Counters::incr(&self.counters.evictions);
            debug!(
                namespace = %self.config.namespace,
                key = victim.key(),
                priority = ?victim.priority(),
                "evicted entry"
            );
            self.persistence.delete(victim.key);
        }
    }

    fn hit(&self, key: &str, value: V) -> V {
        Counters::incr(&self.counters.hits);
        debug!(namespace = %self.config.namespace, key, outcome = "hit", "cache read");
        value
    }

    fn miss(&self, key: &str) -> Option<V> {
        Counters::incr(&self.counters.misses);
        debug!(namespace = %self.config.namespace, key, outcome = "miss", "cache read");
        None
    }

    async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let memory = self.memory().purge_expired(now).len();
        Counters::add(&self.counters.expirations, memory as u64);

        let persistent = match self.persistence.sweep(now).await {
            Ok(n) => n,
            Err(e) => {
                debug!(namespace = %self.config.namespace, error = %e, "persistent sweep skipped");
                0
            }
        };

        if memory + persistent > 0 {
            debug!(
                namespace = %self.config.namespace,
                memory,
                persistent,
                "swept expired entries"
            );
        }
        SweepReport { memory, persistent }
    }
}

fn spawn_sweeper<V>(inner: Weak<Inner<V>>, period: Duration) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.sweep().await;
        }
    })
}
