//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::entry::Priority;
use super::error::CacheError;

/// Default entry TTL: one hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default in-memory capacity, in entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Configuration for a [`TieredCache`](super::TieredCache).
///
/// Capacity is counted in entries, not bytes.
///
/// ```rust
/// use holdfast::cache::{CacheConfig, Priority};
/// use std::time::Duration;
///
/// let config = CacheConfig::new()
///     .with_namespace("events")
///     .with_max_entries(500)
///     .with_default_ttl(Duration::from_secs(600))
///     .with_default_priority(Priority::Low)
///     .with_sweep_interval(Duration::from_secs(60));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Logical name of the cache. Persistent records are stored under
    /// `"{namespace}:{key}"`, so caches with different namespaces can share one
    /// [`DiskStore`](super::DiskStore). Must be non-empty and free of `':'`.
    pub namespace: String,
    /// Maximum entries held in memory before eviction.
    pub max_entries: usize,
    /// TTL used by `put_default`.
    pub default_ttl: Duration,
    /// Priority used by `put_default`.
    pub default_priority: Priority,
    /// Period of the background expiration sweep. `None` disables it.
    pub sweep_interval: Option<Duration>,
    /// Whether a memory miss consults the persistent tier.
    pub rehydrate_on_miss: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: DEFAULT_TTL,
            default_priority: Priority::Medium,
            sweep_interval: Some(Duration::from_secs(300)),
            rehydrate_on_miss: true,
        }
    }
}

impl CacheConfig {
    /// Create a cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment, falling back to defaults.
    ///
    /// - `HOLDFAST_CACHE_NAMESPACE`
    /// - `HOLDFAST_CACHE_MAX_ENTRIES`
    /// - `HOLDFAST_CACHE_DEFAULT_TTL_SECS`
    /// - `HOLDFAST_CACHE_SWEEP_INTERVAL_SECS` (`0` disables the sweep)
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(namespace) = std::env::var("HOLDFAST_CACHE_NAMESPACE") {
            if !namespace.trim().is_empty() {
                config.namespace = namespace;
            }
        }
        if let Some(max) = env_parse::<usize>("HOLDFAST_CACHE_MAX_ENTRIES") {
            config.max_entries = max;
        }
        if let Some(secs) = env_parse::<u64>("HOLDFAST_CACHE_DEFAULT_TTL_SECS") {
            config.default_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("HOLDFAST_CACHE_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the in-memory capacity.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the TTL used by `put_default`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the priority used by `put_default`.
    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Run the background sweep every `interval`.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Disable the background sweep; expiry is then purely lazy.
    pub fn without_sweep(mut self) -> Self {
        self.sweep_interval = None;
        self
    }

    /// Enable or disable cold-start reads from the persistent tier.
    pub fn with_rehydration(mut self, enabled: bool) -> Self {
        self.rehydrate_on_miss = enabled;
        self
    }

    /// Check the configuration's invariants.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.namespace.trim().is_empty() {
            return Err(CacheError::InvalidConfig("namespace must not be empty".into()));
        }
        if self.namespace.contains(super::worker::KEY_SEPARATOR) {
            return Err(CacheError::InvalidConfig("namespace must not contain ':'".into()));
        }
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig("max_entries must be at least 1".into()));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::InvalidConfig("default_ttl must be non-zero".into()));
        }
        if self.sweep_interval.is_some_and(|d| d.is_zero()) {
            return Err(CacheError::InvalidConfig("sweep_interval must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
