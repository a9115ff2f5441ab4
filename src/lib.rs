//! # Holdfast
//!
//! Resilient execution and tiered caching for async Rust services.
//!
//! ## Overview
//!
//! - **[`ResilientExecutor`]** runs an async operation factory under a
//!   [`RetryPolicy`]: per-attempt timeout, exponential backoff with jitter,
//!   a retry predicate separating transient from terminal failures, optional
//!   fallback values, and batch execution that retries only the failed
//!   members.
//! - **[`TieredCache`]** keeps key→value entries in a bounded in-memory tier
//!   backed by a persistent tier, with priority-aware LRU eviction, TTL
//!   expiration and cold-start rehydration.
//!
//! The two are independent. [`read_through::ReadThrough`] composes them into
//! the usual "cache, else fetch with retries, then cache" flow.
//!
//! ## Quick Example
//!
//! ```rust
//! use holdfast::cache::MemoryStore;
//! use holdfast::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache: TieredCache<Vec<String>> =
//!     TieredCache::open(CacheConfig::new().with_namespace("feed"), Arc::new(MemoryStore::new()))
//!         .await
//!         .unwrap();
//!
//! let policy = RetryPolicy::<std::io::Error>::network().with_label("load_feed");
//! let events = ResilientExecutor::new()
//!     .run(|| async { Ok(vec!["signup".to_string()]) }, &policy)
//!     .await
//!     .unwrap();
//!
//! let pinned = CacheOptions::ttl(Duration::from_secs(300)).with_priority(Priority::High);
//! cache.put("feed:1", events, pinned);
//! assert_eq!(cache.get("feed:1").await.map(|e| e.len()), Some(1));
//! # });
//! ```
//!
//! ## Logging
//!
//! Both components emit [`tracing`] events (attempts, backoff delays,
//! timeouts, exhaustion, cache hits and misses, evictions, persistence
//! failures). The crate never installs a subscriber.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cache;
pub mod clock;
pub mod read_through;
pub mod retry;
pub mod testing;

// Re-exports
pub use cache::{CacheConfig, CacheOptions, Priority, TieredCache};
pub use retry::{AttemptError, ExecutorError, ResilientExecutor, RetryExhausted, RetryPolicy};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheConfig, CacheOptions, Priority, TieredCache};
    pub use crate::read_through::ReadThrough;
    pub use crate::retry::{
        AttemptError, ExecutorError, ResilientExecutor, RetryExhausted, RetryPolicy,
    };
}
