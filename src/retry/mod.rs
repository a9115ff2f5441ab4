//! Resilient execution of async operations.
//!
//! - **Pure policy**: [`RetryPolicy`] is data (attempt budget, backoff
//!   schedule, per-attempt timeout, retry predicate, label) and easy to test.
//! - **Executor**: [`ResilientExecutor`] runs an operation factory under a
//!   policy: `run`, `run_with_fallback`, and `run_batch` for partial retry of
//!   independent operations.
//! - **Classification**: [`classify`] gives errors a machine-readable
//!   [`ErrorKind`] and ships the ready-made predicates
//!   [`is_transient_network_error`] and [`is_transient_backend_error`].
//!
//! # Quick Start
//!
//! ```rust
//! use holdfast::retry::{BackendError, ErrorKind};
//! use holdfast::{ResilientExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::<BackendError>::backend()
//!     .with_initial_delay(Duration::from_millis(1))
//!     .with_label("load_events");
//!
//! let result = ResilientExecutor::new()
//!     .run(
//!         || async { Err::<(), _>(BackendError::new(ErrorKind::NotFound, "no such event")) },
//!         &policy,
//!     )
//!     .await;
//!
//! // not-found is terminal: one attempt, no retries
//! assert!(result.unwrap_err().is_terminal());
//! # });
//! ```
//!
//! # Delay schedule
//!
//! The delay after failed attempt `n` is
//! `min(max_delay, initial_delay * backoff_factor^(n - 1) * jitter)`, where
//! jitter is sampled uniformly from `[0.85, 1.15]` by default.
//!
//! # Error Types
//!
//! - [`ExecutorError`]: terminal failure, exhaustion, or invalid policy
//! - [`RetryExhausted`]: the last error plus attempt count and elapsed time
//! - [`AttemptError`]: an operation error or a per-attempt timeout

mod batch;
pub mod classify;
mod error;
mod executor;
mod policy;

pub use batch::BatchResults;
pub use classify::{
    is_transient_backend_error, is_transient_network_error, BackendError, Classify, ErrorKind,
};
pub use error::{AttemptError, ExecutorError, PolicyError, RetryExhausted};
pub use executor::{AttemptOutcome, ResilientExecutor};
pub use policy::{Backoff, JitterStrategy, RetryPolicy, RetryPredicate};

#[cfg(test)]
mod tests;
