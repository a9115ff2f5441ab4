//! The in-memory tier: entries plus an eviction index ordered by
//! `(priority, last_accessed_at, sequence)`.

use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

use super::entry::{CacheEntry, Priority};

/// Position of an entry in eviction order. The smallest key is evicted first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EvictionKey {
    priority: Priority,
    last_accessed: SystemTime,
    seq: u64,
    key: String,
}

#[derive(Debug)]
struct Slot<V> {
    entry: CacheEntry<V>,
    seq: u64,
}

impl<V> Slot<V> {
    fn eviction_key(&self) -> EvictionKey {
        EvictionKey {
            priority: self.entry.priority,
            last_accessed: self.entry.last_accessed_at,
            seq: self.seq,
            key: self.entry.key.clone(),
        }
    }
}

/// Outcome of a memory lookup.
#[derive(Debug, PartialEq)]
pub(crate) enum Lookup<V> {
    Hit(V),
    Expired,
    Missing,
}

#[derive(Debug)]
pub(crate) struct MemoryTier<V> {
    entries: HashMap<String, Slot<V>>,
    order: BTreeSet<EvictionKey>,
    next_seq: u64,
    generation: u64,
}

impl<V> Default for MemoryTier<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeSet::new(),
            next_seq: 0,
            generation: 0,
        }
    }
}

impl<V: Clone> MemoryTier<V> {
    /// Return a copy of a fresh value and mark it accessed at `now`. Stale
    /// entries are dropped on the way.
    pub(crate) fn lookup(&mut self, key: &str, now: SystemTime) -> Lookup<V> {
        let expired = match self.entries.get(key) {
            None => return Lookup::Missing,
            Some(slot) => slot.entry.is_expired(now),
        };
        if expired {
            self.remove(key);
            return Lookup::Expired;
        }

        let seq = self.bump_seq();
        let Some(slot) = self.entries.get_mut(key) else {
            return Lookup::Missing;
        };
        self.order.remove(&slot.eviction_key());
        slot.entry.last_accessed_at = slot.entry.last_accessed_at.max(now);
        slot.seq = seq;
        self.order.insert(slot.eviction_key());
        Lookup::Hit(slot.entry.value.clone())
    }
}

impl<V> MemoryTier<V> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Changes on every insert, remove and clear (not on reads).
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn contains_fresh(&self, key: &str, now: SystemTime) -> bool {
        self.entries
            .get(key)
            .is_some_and(|slot| !slot.entry.is_expired(now))
    }

    /// Insert or replace an entry. Returns the replaced entry, if any.
    pub(crate) fn insert(&mut self, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        let previous = self.remove(&entry.key);
        let seq = self.bump_seq();
        let slot = Slot { entry, seq };
        self.order.insert(slot.eviction_key());
        self.entries.insert(slot.entry.key.clone(), slot);
        self.generation += 1;
        previous
    }

    /// Bumps the generation even when `key` is absent, so an in-flight
    /// rehydration of `key` sees the remove.
    pub(crate) fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.generation += 1;
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.eviction_key());
        Some(slot.entry)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.generation += 1;
    }

    /// Remove the entry with the lowest `(priority, last_accessed_at)`.
    pub(crate) fn evict_one(&mut self) -> Option<CacheEntry<V>> {
        let victim = self.order.first()?.key.clone();
        self.remove(&victim)
    }

    /// Remove every entry stale at `now`, returning their keys.
    pub(crate) fn purge_expired(&mut self, now: SystemTime) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|slot| slot.entry.is_expired(now))
            .map(|slot| slot.entry.key.clone())
            .collect();
        for key in &stale {
            self.remove(key);
        }
        stale
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}
