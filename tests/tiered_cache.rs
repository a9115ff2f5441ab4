//! Integration tests for the two-tier cache.

use async_trait::async_trait;
use holdfast::cache::{
    CacheConfig, CacheOptions, DiskStore, MemoryStore, Priority, StoreError, TieredCache,
};
use holdfast::testing::{FailingStore, ManualClock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing_test::traced_test;

const MINUTE: Duration = Duration::from_secs(60);

fn config(max_entries: usize) -> CacheConfig {
    CacheConfig::new()
        .with_namespace("test")
        .with_max_entries(max_entries)
        .without_sweep()
}

async fn open_with(
    config: CacheConfig,
    store: Arc<dyn DiskStore>,
    clock: &ManualClock,
) -> TieredCache<String> {
    TieredCache::with_clock(config, store, Arc::new(clock.clone()))
        .await
        .unwrap()
}

fn low(ttl: Duration) -> CacheOptions {
    CacheOptions::ttl(ttl).with_priority(Priority::Low)
}

fn high(ttl: Duration) -> CacheOptions {
    CacheOptions::ttl(ttl).with_priority(Priority::High)
}

#[tokio::test]
async fn test_put_then_get_returns_value() {
    let clock = ManualClock::new();
    let cache = open_with(config(10), Arc::new(MemoryStore::new()), &clock).await;

    cache.put("user:1", "ada".to_string(), CacheOptions::ttl(MINUTE));
    cache.put("user:2", "grace".to_string(), CacheOptions::ttl(MINUTE));
    cache.put("user:1", "ada lovelace".to_string(), CacheOptions::ttl(MINUTE));

    assert_eq!(cache.get("user:1").await, Some("ada lovelace".to_string()));
    assert_eq!(cache.get("user:2").await, Some("grace".to_string()));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().hits, 2);
}

#[tokio::test]
async fn test_expired_entry_stays_absent() {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryStore::new());
    let cache = open_with(config(10), store.clone(), &clock).await;

    cache.put("session", "token".to_string(), CacheOptions::ttl(Duration::from_secs(30)));
    clock.advance(Duration::from_secs(31));

    assert_eq!(cache.get("session").await, None);
    assert_eq!(cache.get("session").await, None);
    cache.flush().await.unwrap();
    assert!(!store.contains("test:session"));

    let stats = cache.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_capacity_evicts_least_recent_low_entry() {
    let clock = ManualClock::new();
    let cache = open_with(config(2), Arc::new(MemoryStore::new()), &clock).await;

    cache.put("a", "1".to_string(), low(MINUTE));
    clock.advance(Duration::from_secs(1));
    cache.put("b", "2".to_string(), low(MINUTE));
    clock.advance(Duration::from_secs(1));
    assert!(cache.get("a").await.is_some());

    cache.put("c", "3".to_string(), high(MINUTE));

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains_key("b"));
    assert_eq!(cache.get("a").await, Some("1".to_string()));
    assert_eq!(cache.get("c").await, Some("3".to_string()));
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_high_priority_newcomer_is_never_evicted() {
    let clock = ManualClock::new();
    let capacity = 5;
    let cache = open_with(config(capacity), Arc::new(MemoryStore::new()), &clock).await;

    for i in 0..capacity {
        cache.put(format!("low:{i}"), i.to_string(), low(MINUTE));
    }
    cache.put("vip", "x".to_string(), high(MINUTE));

    assert_eq!(cache.len(), capacity);
    assert!(cache.contains_key("vip"));
    assert!(!cache.contains_key("low:0"));
}

#[tokio::test]
async fn test_full_cache_purges_stale_before_evicting() {
    let clock = ManualClock::new();
    let cache = open_with(config(2), Arc::new(MemoryStore::new()), &clock).await;

    cache.put("fresh", "1".to_string(), low(MINUTE));
    cache.put("stale", "2".to_string(), high(Duration::from_secs(5)));
    clock.advance(Duration::from_secs(10));
    cache.put("new", "3".to_string(), low(MINUTE));

    assert!(cache.contains_key("fresh"));
    assert!(cache.contains_key("new"));
    let stats = cache.stats();
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.expirations, 1);
}

#[tokio::test]
async fn test_clear_all_empties_both_tiers() {
    let clock = ManualClock::new();
    let store: Arc<dyn DiskStore> = Arc::new(MemoryStore::new());

    let writer = open_with(config(10), store.clone(), &clock).await;
    writer.put("disk-only", "old".to_string(), CacheOptions::ttl(MINUTE));
    writer.flush().await.unwrap();

    let cache = open_with(config(10), store.clone(), &clock).await;
    cache.put("both", "new".to_string(), CacheOptions::ttl(MINUTE));
    cache.clear_all();

    assert_eq!(cache.get("both").await, None);
    assert_eq!(cache.get("disk-only").await, None);
    assert!(cache.is_empty());
    assert!(store.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cold_start_rehydrates_from_persistent_tier() {
    let clock = ManualClock::new();
    let store: Arc<dyn DiskStore> = Arc::new(MemoryStore::new());

    let first = open_with(config(10), store.clone(), &clock).await;
    first.put("feed", "cached".to_string(), high(MINUTE));
    first.close().await.unwrap();

    let second = open_with(config(10), store, &clock).await;
    assert!(second.is_empty());
    assert_eq!(second.get("feed").await, Some("cached".to_string()));
    assert!(second.contains_key("feed"));

    let stats = second.stats();
    assert_eq!(stats.rehydrations, 1);
    assert_eq!(stats.entry_count, 1);
}

#[tokio::test]
async fn test_stale_persisted_entry_is_not_rehydrated() {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryStore::new());

    let first = open_with(config(10), store.clone(), &clock).await;
    first.put("feed", "cached".to_string(), CacheOptions::ttl(Duration::from_secs(10)));
    first.close().await.unwrap();

    clock.advance(Duration::from_secs(11));
    let second = open_with(config(10), store.clone(), &clock).await;

    assert_eq!(second.get("feed").await, None);
    second.flush().await.unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_rehydration_can_be_disabled() {
    let clock = ManualClock::new();
    let store: Arc<dyn DiskStore> = Arc::new(MemoryStore::new());

    let first = open_with(config(10), store.clone(), &clock).await;
    first.put("feed", "cached".to_string(), CacheOptions::ttl(MINUTE));
    first.close().await.unwrap();

    let second = open_with(config(10).with_rehydration(false), store, &clock).await;
    assert_eq!(second.get("feed").await, None);
}

#[tokio::test]
async fn test_remove_is_idempotent_across_tiers() {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryStore::new());
    let cache = open_with(config(10), store.clone(), &clock).await;

    cache.put("k", "v".to_string(), CacheOptions::ttl(MINUTE));
    cache.remove("k");
    cache.remove("k");
    cache.remove("never-existed");

    assert_eq!(cache.get("k").await, None);
    cache.flush().await.unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_get_returns_independent_copy() {
    let clock = ManualClock::new();
    let cache: TieredCache<Vec<String>> =
        TieredCache::with_clock(config(10), Arc::new(MemoryStore::new()), Arc::new(clock))
            .await
            .unwrap();

    cache.put("list", vec!["a".to_string()], CacheOptions::ttl(MINUTE));
    let mut copy = cache.get("list").await.unwrap();
    copy.push("b".to_string());

    assert_eq!(cache.get("list").await, Some(vec!["a".to_string()]));
}

#[tokio::test]
#[traced_test]
async fn test_persistence_failures_are_swallowed() {
    let clock = ManualClock::new();
    let cache = open_with(config(10), Arc::new(FailingStore::new()), &clock).await;

    cache.put("k", "v".to_string(), CacheOptions::ttl(MINUTE));
    cache.remove("other");
    assert_eq!(cache.get("k").await, Some("v".to_string()));

    assert!(cache.flush().await.is_err());
    assert!(cache.stats().persistence_failures >= 2);
    assert!(logs_contain("persistent tier operation failed"));
}

#[tokio::test]
async fn test_failing_reads_count_as_miss() {
    let clock = ManualClock::new();
    let cache = open_with(
        config(10),
        Arc::new(FailingStore::new().failing_reads()),
        &clock,
    )
    .await;

    assert_eq!(cache.get("missing").await, None);
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test]
async fn test_manual_sweep_purges_both_tiers() {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryStore::new());
    let cache = open_with(config(10), store.clone(), &clock).await;

    cache.put("short", "1".to_string(), CacheOptions::ttl(Duration::from_secs(5)));
    cache.put("long", "2".to_string(), CacheOptions::ttl(MINUTE));
    clock.advance(Duration::from_secs(6));

    let report = cache.sweep_expired().await;

    assert_eq!(report.memory, 1);
    assert_eq!(report.persistent, 1);
    assert_eq!(cache.len(), 1);
    assert!(store.contains("test:long"));
    assert!(!store.contains("test:short"));
}

#[tokio::test(start_paused = true)]
async fn test_background_sweeper_runs_on_interval() {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryStore::new());
    let config = config(10).with_sweep_interval(MINUTE);
    let cache = open_with(config, store.clone(), &clock).await;

    cache.put("short", "1".to_string(), CacheOptions::ttl(Duration::from_secs(30)));
    clock.advance(Duration::from_secs(31));
    assert_eq!(cache.len(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(cache.len(), 0);
    assert_eq!(cache.stats().expirations, 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_put_default_uses_config_defaults() {
    let clock = ManualClock::new();
    let config = config(10)
        .with_default_ttl(Duration::from_secs(10))
        .with_default_priority(Priority::High);
    let cache = open_with(config, Arc::new(MemoryStore::new()), &clock).await;

    cache.put_default("k", "v".to_string());
    clock.advance(Duration::from_secs(9));
    assert!(cache.contains_key("k"));
    clock.advance(Duration::from_secs(1));
    assert!(!cache.contains_key("k"));
}

#[tokio::test]
async fn test_namespaces_sharing_a_store_are_isolated() {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn DiskStore> = store.clone();

    let users = open_with(config(10).with_namespace("users"), shared.clone(), &clock).await;
    users.put("k", "ada".to_string(), CacheOptions::ttl(MINUTE));
    users.put("other", "grace".to_string(), CacheOptions::ttl(MINUTE));
    users.close().await.unwrap();

    let counts: TieredCache<u64> = TieredCache::with_clock(
        config(10).with_namespace("counts"),
        shared.clone(),
        Arc::new(clock.clone()),
    )
    .await
    .unwrap();
    assert_eq!(counts.get("k").await, None);
    counts.put("other", 7, CacheOptions::ttl(MINUTE));
    counts.clear_all();
    counts.flush().await.unwrap();

    assert!(store.contains("users:k"));
    assert!(store.contains("users:other"));
    assert!(!store.contains("counts:other"));

    let users = open_with(config(10).with_namespace("users"), shared, &clock).await;
    assert_eq!(users.get("k").await, Some("ada".to_string()));
    assert_eq!(users.get("other").await, Some("grace".to_string()));
}

#[tokio::test]
#[traced_test]
async fn test_undecodable_record_is_a_miss_and_kept() {
    let clock = ManualClock::new();
    let store = Arc::new(MemoryStore::new());
    store.put("test:k", b"not a cache record").await.unwrap();

    let cache = open_with(config(10), store.clone(), &clock).await;
    assert_eq!(cache.get("k").await, None);
    cache.flush().await.unwrap();

    assert!(store.contains("test:k"));
    assert_eq!(cache.stats().misses, 1);
    assert!(logs_contain("ignoring undecodable persisted entry"));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result: Result<TieredCache<String>, _> =
        TieredCache::open(config(0), Arc::new(MemoryStore::new())).await;
    assert!(result.is_err());
}

/// Store whose reads block until released, to interleave a remove with an
/// in-flight rehydration.
#[derive(Debug)]
struct GatedStore {
    inner: MemoryStore,
    gated: AtomicBool,
    waiting: AtomicUsize,
    gate: Semaphore,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gated: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    fn close_gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(1);
    }

    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiskStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.gated.load(Ordering::SeqCst) {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Transaction(e.to_string()))?;
            permit.forget();
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.put(key, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys().await
    }
}

#[tokio::test]
async fn test_remove_during_rehydration_is_not_undone() {
    let clock = ManualClock::new();
    let store = Arc::new(GatedStore::new());

    let writer = open_with(config(10), store.clone(), &clock).await;
    writer.put("k", "v".to_string(), CacheOptions::ttl(MINUTE));
    writer.close().await.unwrap();

    let cache = Arc::new(open_with(config(10), store.clone(), &clock).await);
    store.close_gate();

    let reader = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get("k").await }
    });
    while store.waiting() == 0 {
        tokio::task::yield_now().await;
    }

    cache.remove("k");
    store.release();

    assert_eq!(reader.await.unwrap(), Some("v".to_string()));
    assert!(!cache.contains_key("k"));
    assert_eq!(cache.get("k").await, None);
}

#[cfg(feature = "lmdb")]
mod lmdb {
    use super::*;
    use holdfast::cache::LmdbStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lmdb_backed_cold_start() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn DiskStore> =
            Arc::new(LmdbStore::open(dir.path(), "events", 16).unwrap());
        let clock = ManualClock::new();

        let first = open_with(config(10).with_namespace("events"), store.clone(), &clock).await;
        first.put("event:1", "signup".to_string(), high(MINUTE));
        first.put("event:2", "login".to_string(), low(MINUTE));
        first.close().await.unwrap();

        let second = open_with(config(10).with_namespace("events"), store.clone(), &clock).await;
        assert_eq!(second.get("event:1").await, Some("signup".to_string()));
        assert_eq!(second.get("event:2").await, Some("login".to_string()));

        second.clear_all();
        second.flush().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }
}
