//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time snapshot of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from either tier.
    pub hits: u64,
    /// Reads that found nothing fresh.
    pub misses: u64,
    /// Entries removed to make room.
    pub evictions: u64,
    /// Stale entries dropped on read or by a sweep.
    pub expirations: u64,
    /// Entries promoted from the persistent tier into memory.
    pub rehydrations: u64,
    /// Persistent-tier operations that failed and were swallowed.
    pub persistence_failures: u64,
    /// Entries currently held in memory.
    pub entry_count: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) expirations: AtomicU64,
    pub(crate) rehydrations: AtomicU64,
    pub(crate) persistence_failures: AtomicU64,
}

impl Counters {
    pub(crate) fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            rehydrations: self.rehydrations.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            entry_count: entry_count as u64,
        }
    }
}
