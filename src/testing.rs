//! Testing utilities for code built on holdfast.
//!
//! - [`ManualClock`]: a wall clock that only moves when told to.
//! - [`ScriptedOperation`]: an operation factory that fails or stalls on a
//!   scripted prefix of its calls and counts invocations.
//! - [`FailingStore`]: a [`DiskStore`] whose writes always fail.
//! - [`assert_terminal!`](crate::assert_terminal) and
//!   [`assert_exhausted!`](crate::assert_exhausted) for executor results.
//!
//! # Examples
//!
//! ```rust
//! use holdfast::testing::ScriptedOperation;
//! use holdfast::{assert_exhausted, ResilientExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let op = ScriptedOperation::new(42).failing_first(10, "unavailable");
//! let policy = RetryPolicy::exponential(Duration::from_millis(1)).with_max_attempts(2);
//!
//! let result = ResilientExecutor::new().run(|| op.call(), &policy).await;
//! assert_exhausted!(result, 2);
//! assert_eq!(op.calls(), 2);
//! # });
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::cache::{DiskStore, StoreError};
use crate::clock::Clock;

/// A [`Clock`] that stands still until advanced.
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the cache.
///
/// ```rust
/// use holdfast::clock::Clock;
/// use holdfast::testing::ManualClock;
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now(), start + Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    /// A clock at a fixed, whole-second point in time.
    pub fn new() -> Self {
        Self::at(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    /// A clock at `time`.
    pub fn at(time: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jump to `time` (forwards or backwards).
    pub fn set(&self, time: SystemTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Operation factory with a scripted failure prefix.
///
/// Call `n` (1-indexed) fails with a clone of the scripted error while
/// `n <= fail_first` and succeeds with a clone of the value afterwards. Calls
/// with `n <= stall_first` sleep for the stall duration before answering,
/// which is how tests provoke per-attempt timeouts.
///
/// Clones share the call counter.
#[derive(Debug, Clone)]
pub struct ScriptedOperation<T, E> {
    value: T,
    error: Option<E>,
    fail_first: u32,
    stall_first: u32,
    stall_for: Duration,
    calls: Arc<AtomicU32>,
}

impl<T, E> ScriptedOperation<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// An operation that always succeeds with `value`.
    pub fn new(value: T) -> Self {
        Self {
            value,
            error: None,
            fail_first: 0,
            stall_first: 0,
            stall_for: Duration::ZERO,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail the first `n` calls with `error`.
    pub fn failing_first(mut self, n: u32, error: E) -> Self {
        self.fail_first = n;
        self.error = Some(error);
        self
    }

    /// Sleep for `duration` at the start of the first `n` calls.
    pub fn stalling_first(mut self, n: u32, duration: Duration) -> Self {
        self.stall_first = n;
        self.stall_for = duration;
        self
    }

    /// Start one invocation.
    pub fn call(&self) -> BoxFuture<'static, Result<T, E>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let stall = (n <= self.stall_first).then_some(self.stall_for);
        let result = match &self.error {
            Some(error) if n <= self.fail_first => Err(error.clone()),
            _ => Ok(self.value.clone()),
        };

        Box::pin(async move {
            if let Some(duration) = stall {
                tokio::time::sleep(duration).await;
            }
            result
        })
    }

    /// How many times [`call`](Self::call) has been invoked.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// [`DiskStore`] whose writes always fail.
///
/// Reads find nothing unless [`failing_reads`](Self::failing_reads) is set,
/// in which case they fail too. Every attempted operation is counted.
#[derive(Debug, Default)]
pub struct FailingStore {
    fail_reads: bool,
    attempts: AtomicU64,
}

impl FailingStore {
    /// A store whose writes fail and whose reads find nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make reads fail as well.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Operations attempted against the store.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail<T>(&self, op: &str) -> Result<T, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Transaction(format!("{op}: disk unavailable")))
    }
}

#[async_trait]
impl DiskStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_reads {
            return self.fail("get");
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    async fn put(&self, _key: &str, _bytes: &[u8]) -> Result<(), StoreError> {
        self.fail("put")
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        self.fail("delete")
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.fail("clear")
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.fail("keys")
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.fail("flush")
    }
}

/// Assert that an executor result is a terminal failure, optionally on a
/// given attempt.
///
/// # Example
///
/// ```rust
/// use holdfast::{assert_terminal, ExecutorError};
///
/// let result: Result<(), ExecutorError<&str>> = Err(ExecutorError::Terminal {
///     error: "forbidden",
///     attempt: 1,
/// });
/// assert_terminal!(result, 1);
/// ```
#[macro_export]
macro_rules! assert_terminal {
    ($result:expr) => {
        match $result {
            Err($crate::ExecutorError::Terminal { .. }) => {}
            other => panic!("Expected terminal failure, got: {:?}", other),
        }
    };
    ($result:expr, $attempt:expr) => {
        match $result {
            Err($crate::ExecutorError::Terminal { attempt, .. }) => {
                assert_eq!(attempt, $attempt, "terminal failure on unexpected attempt");
            }
            other => panic!("Expected terminal failure, got: {:?}", other),
        }
    };
}

/// Assert that an executor result is an exhausted retry budget, optionally
/// after a given number of attempts.
///
/// # Example
///
/// ```rust
/// use holdfast::retry::{AttemptError, RetryExhausted};
/// use holdfast::{assert_exhausted, ExecutorError};
/// use std::time::Duration;
///
/// let result: Result<(), ExecutorError<&str>> = Err(ExecutorError::Exhausted(
///     RetryExhausted::new(AttemptError::Failed("unavailable"), 3, Duration::ZERO),
/// ));
/// assert_exhausted!(result, 3);
/// ```
#[macro_export]
macro_rules! assert_exhausted {
    ($result:expr) => {
        match $result {
            Err($crate::ExecutorError::Exhausted(_)) => {}
            other => panic!("Expected exhausted retries, got: {:?}", other),
        }
    };
    ($result:expr, $attempts:expr) => {
        match $result {
            Err($crate::ExecutorError::Exhausted(exhausted)) => {
                assert_eq!(
                    exhausted.attempts, $attempts,
                    "exhausted after unexpected attempt count"
                );
            }
            other => panic!("Expected exhausted retries, got: {:?}", other),
        }
    };
}
