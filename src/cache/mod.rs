//! Two-tier cache: a bounded in-memory tier backed by a persistent tier.
//!
//! # Overview
//!
//! - [`TieredCache`]: the cache itself. `put` is synchronous; `get` is async
//!   because a memory miss may read the persistent tier.
//! - [`CacheOptions`] and [`Priority`]: per-entry TTL and eviction rank.
//! - [`CacheConfig`]: capacity, defaults and the background sweep.
//! - [`DiskStore`]: the persistent tier, with [`MemoryStore`] and (feature
//!   `lmdb`, on by default) [`LmdbStore`] implementations.
//!
//! # Eviction
//!
//! Capacity is counted in entries. When a new key arrives at a full cache,
//! stale entries are purged first; if that is not enough the entry with the
//! lowest `(priority, last_accessed_at)` is evicted. A `High` entry is never
//! evicted while a `Low` or `Medium` one remains.
//!
//! # Expiration
//!
//! Stale entries are never returned. They are dropped lazily on read and
//! eagerly by [`TieredCache::sweep_expired`], which a background task runs
//! every `sweep_interval` when configured.
//!
//! ```rust
//! use holdfast::cache::{CacheConfig, CacheOptions, MemoryStore, Priority, TieredCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let config = CacheConfig::new().with_namespace("feed").with_max_entries(2).without_sweep();
//! let cache: TieredCache<u32> = TieredCache::open(config, Arc::new(MemoryStore::new()))
//!     .await
//!     .unwrap();
//!
//! let ttl = Duration::from_secs(60);
//! cache.put("a", 1, CacheOptions::ttl(ttl).with_priority(Priority::Low));
//! cache.put("b", 2, CacheOptions::ttl(ttl).with_priority(Priority::Low));
//! cache.put("c", 3, CacheOptions::ttl(ttl).with_priority(Priority::High));
//!
//! assert_eq!(cache.len(), 2);
//! assert!(!cache.contains_key("a"));
//! assert_eq!(cache.stats().evictions, 1);
//! # });
//! ```

mod config;
mod entry;
mod error;
#[cfg(feature = "lmdb")]
mod lmdb;
mod memory;
mod stats;
mod store;
mod tiered;
mod worker;

pub use config::{CacheConfig, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
pub use entry::{CacheEntry, CacheOptions, Priority, MIN_TTL};
pub use error::{CacheError, StoreError};
#[cfg(feature = "lmdb")]
pub use lmdb::LmdbStore;
pub use stats::CacheStats;
pub use store::{DiskStore, MemoryStore};
pub use tiered::{SweepReport, TieredCache};
