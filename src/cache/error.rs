//! Cache and persistent-store errors.

/// Error from a [`DiskStore`](super::DiskStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to open or create the store.
    #[error("failed to open store: {0}")]
    Open(String),

    /// A read or write transaction failed.
    #[error("store transaction failed: {0}")]
    Transaction(String),

    /// Flushing buffered writes to durable storage failed.
    #[error("store flush failed: {0}")]
    Flush(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error surfaced by [`TieredCache`](super::TieredCache).
///
/// Reads and writes never fail: misses are `None` and persistence failures
/// are logged. Errors only come from opening, flushing, or closing the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The configuration violates an invariant.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// The persistent store reported an error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The persistence worker is no longer running.
    #[error("persistence worker stopped")]
    WorkerStopped,
}
