//! Wall-clock abstraction shared by the cache tiers.
//!
//! Cache timestamps are persisted to disk and must survive a process restart,
//! so they are wall-clock [`SystemTime`] values rather than monotonic
//! [`Instant`](std::time::Instant)s. The [`Clock`] trait lets tests drive time
//! explicitly (see [`ManualClock`](crate::testing::ManualClock)).

use std::fmt::Debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current wall-clock time.
pub trait Clock: Debug + Send + Sync + 'static {
    /// The current time.
    fn now(&self) -> SystemTime;
}

/// [`Clock`] backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Milliseconds since the Unix epoch, saturating at zero for pre-epoch times.
pub(crate) fn to_epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

/// Inverse of [`to_epoch_millis`].
pub(crate) fn from_epoch_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}
