//! Cache entries, priorities, and the persisted record format.

use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::{from_epoch_millis, to_epoch_millis};

/// Smallest TTL an entry can carry; shorter TTLs are raised to this so that
/// `expires_at > created_at` always holds, even after millisecond truncation.
pub const MIN_TTL: Duration = Duration::from_millis(1);

/// Eviction priority. Lower priorities are evicted first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// First to go under capacity pressure.
    Low,
    /// The default.
    #[default]
    Medium,
    /// Evicted only when nothing of lower priority remains.
    High,
}

/// Per-`put` options.
///
/// # Example
///
/// ```rust
/// use holdfast::cache::{CacheOptions, Priority};
/// use std::time::Duration;
///
/// let opts = CacheOptions::ttl(Duration::from_secs(300)).with_priority(Priority::High);
/// assert_eq!(opts.priority, Priority::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Eviction priority of the entry.
    pub priority: Priority,
    /// Time until the entry becomes stale.
    pub ttl: Duration,
}

impl CacheOptions {
    /// Options with the given TTL and [`Priority::Medium`].
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            priority: Priority::default(),
            ttl,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::ttl(super::config::DEFAULT_TTL)
    }
}

/// An entry as held by the in-memory tier.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub(crate) key: String,
    pub(crate) value: V,
    pub(crate) created_at: SystemTime,
    pub(crate) expires_at: SystemTime,
    pub(crate) priority: Priority,
    pub(crate) last_accessed_at: SystemTime,
}

impl<V> CacheEntry<V> {
    /// Create a fresh entry written at `now`.
    pub fn new(
        key: impl Into<String>,
        value: V,
        now: SystemTime,
        ttl: Duration,
        priority: Priority,
    ) -> Self {
        let ttl = ttl.max(MIN_TTL);
        let expires_at = now.checked_add(ttl).unwrap_or(now + MIN_TTL);
        Self {
            key: key.into(),
            value,
            created_at: now,
            expires_at,
            priority,
            last_accessed_at: now,
        }
    }

    /// The entry's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// When the entry was written.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// When the entry becomes stale.
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Eviction priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Last successful read (or the write time if never read).
    pub fn last_accessed_at(&self) -> SystemTime {
        self.last_accessed_at
    }

    /// Stale entries are logically absent.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// On-disk form of an entry. `last_accessed_at` is memory-only.
#[derive(Serialize, Deserialize)]
struct PersistedEntry<V> {
    value: V,
    created_at_ms: u64,
    expires_at_ms: u64,
    priority: Priority,
}

#[derive(Serialize)]
struct PersistedEntryRef<'a, V> {
    value: &'a V,
    created_at_ms: u64,
    expires_at_ms: u64,
    priority: Priority,
}

/// Just enough of a record to decide expiry without knowing the value type.
#[derive(Deserialize)]
struct PersistedHeader {
    expires_at_ms: u64,
}

impl<V: Serialize> CacheEntry<V> {
    /// Encode for the persistent tier.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&PersistedEntryRef {
            value: &self.value,
            created_at_ms: to_epoch_millis(self.created_at),
            expires_at_ms: to_epoch_millis(self.expires_at),
            priority: self.priority,
        })
    }
}

impl<V: DeserializeOwned> CacheEntry<V> {
    /// Decode a persisted record, treating `now` as its last access.
    pub(crate) fn decode(
        key: &str,
        bytes: &[u8],
        now: SystemTime,
    ) -> Result<Self, serde_json::Error> {
        let record: PersistedEntry<V> = serde_json::from_slice(bytes)?;
        Ok(Self {
            key: key.to_string(),
            value: record.value,
            created_at: from_epoch_millis(record.created_at_ms),
            expires_at: from_epoch_millis(record.expires_at_ms),
            priority: record.priority,
            last_accessed_at: now,
        })
    }
}

/// Whether a persisted record is stale at `now`. Undecodable records count as
/// stale so sweeps remove them.
pub(crate) fn persisted_is_expired(bytes: &[u8], now: SystemTime) -> bool {
    match serde_json::from_slice::<PersistedHeader>(bytes) {
        Ok(header) => to_epoch_millis(now) >= header.expires_at_ms,
        Err(_) => true,
    }
}
