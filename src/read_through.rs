//! Read-through composition of [`TieredCache`] and [`ResilientExecutor`].
//!
//! Neither component knows about the other; this helper wires the usual
//! control flow: cache `get`, on a miss a retried fetch, then cache `put`.
//!
//! ```rust
//! use holdfast::cache::{CacheConfig, CacheOptions, MemoryStore, TieredCache};
//! use holdfast::read_through::ReadThrough;
//! use holdfast::RetryPolicy;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache: TieredCache<String> =
//!     TieredCache::open(CacheConfig::new(), Arc::new(MemoryStore::new()))
//!         .await
//!         .unwrap();
//! let profiles = ReadThrough::new(&cache, RetryPolicy::<std::io::Error>::network());
//!
//! let name = profiles
//!     .get_or_fetch("user:7", CacheOptions::ttl(Duration::from_secs(60)), || async {
//!         Ok("ada".to_string())
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(name, "ada");
//! assert!(cache.contains_key("user:7"));
//! # });
//! ```

use std::fmt::Debug;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheOptions, TieredCache};
use crate::retry::{ExecutorError, ResilientExecutor, RetryPolicy};

/// A cache paired with the policy used to fill it.
#[derive(Debug)]
pub struct ReadThrough<'a, V, E> {
    cache: &'a TieredCache<V>,
    executor: ResilientExecutor,
    policy: RetryPolicy<E>,
}

impl<'a, V, E> ReadThrough<'a, V, E>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    E: Debug,
{
    /// Fill `cache` using `policy` on misses.
    pub fn new(cache: &'a TieredCache<V>, policy: RetryPolicy<E>) -> Self {
        Self {
            cache,
            executor: ResilientExecutor::new(),
            policy,
        }
    }

    /// The policy fetches run under.
    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    /// Return the cached value for `key`, or fetch, cache and return it.
    ///
    /// Only successful fetches are cached. A failed fetch leaves the cache
    /// untouched and returns the executor's error.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        fetch: F,
    ) -> Result<V, ExecutorError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.cache.get(key).await {
            return Ok(value);
        }

        debug!(key, label = self.policy.label(), "cache miss, fetching");
        let value = self.executor.run(fetch, &self.policy).await?;
        self.cache.put(key, value.clone(), options);
        Ok(value)
    }

    /// [`get_or_fetch`](Self::get_or_fetch), serving `fallback` (uncached)
    /// when the retry budget runs out.
    pub async fn get_or_fetch_with_fallback<F, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        fetch: F,
        fallback: V,
    ) -> Result<V, ExecutorError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        match self.get_or_fetch(key, options, fetch).await {
            Err(ExecutorError::Exhausted(exhausted)) => {
                warn!(
                    key,
                    label = self.policy.label(),
                    attempts = exhausted.attempts,
                    "fetch exhausted retries, serving fallback"
                );
                Ok(fallback)
            }
            other => other,
        }
    }
}
