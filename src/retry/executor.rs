//! The resilient executor: timeout, retry, backoff and fallback around a
//! single async operation.

use std::fmt::Debug;
use std::future::Future;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::{AttemptError, ExecutorError, RetryExhausted};
use super::policy::RetryPolicy;

/// Result of one attempt, classified against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome<T, E> {
    /// The operation produced a value.
    Success(T),
    /// The operation failed and the predicate allows another attempt.
    RetryableFailure(E),
    /// The operation failed and the predicate forbids another attempt.
    TerminalFailure(E),
    /// The attempt did not finish within the per-attempt timeout.
    TimedOut,
}

/// Runs async operations under a [`RetryPolicy`].
///
/// The executor holds no state; every call is driven entirely by the policy
/// it receives. Operations are passed as factories (`Fn() -> Future`) so each
/// attempt starts from scratch with a fresh future.
///
/// # Cancellation
///
/// A timed-out attempt's future is dropped, which cancels it at its next
/// suspension point. Work the operation spawned onto the runtime itself is
/// not cancelled and may still complete after the timeout; its result is
/// discarded. Callers performing non-idempotent writes must account for a
/// write landing after a declared timeout.
///
/// # Example
///
/// ```rust
/// use holdfast::{ResilientExecutor, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::<String>::exponential(Duration::from_millis(1))
///     .with_max_attempts(3)
///     .with_label("load_profile");
///
/// let value = ResilientExecutor::new()
///     .run(|| async { Ok::<_, String>(42) }, &policy)
///     .await;
///
/// assert_eq!(value, Ok(42));
/// # });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ResilientExecutor;

impl ResilientExecutor {
    /// Create an executor.
    pub const fn new() -> Self {
        Self
    }

    /// Run `operation` until it succeeds, fails terminally, or runs out of
    /// attempts.
    ///
    /// - A timeout is always retryable; the predicate is not consulted.
    /// - An error the predicate rejects is returned at once as
    ///   [`ExecutorError::Terminal`].
    /// - After `max_attempts` retryable failures the last one is returned
    ///   inside [`ExecutorError::Exhausted`].
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: F,
        policy: &RetryPolicy<E>,
    ) -> Result<T, ExecutorError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        policy.validate()?;

        let start = Instant::now();
        let mut attempt = 1u32;

        loop {
            let failure = match attempt_once(&operation, policy).await {
                AttemptOutcome::Success(value) => {
                    if attempt > 1 {
                        info!(label = policy.label(), attempt, "operation recovered after retry");
                    }
                    return Ok(value);
                }
                AttemptOutcome::TerminalFailure(error) => {
                    warn!(
                        label = policy.label(),
                        attempt,
                        error = ?error,
                        "terminal failure, not retrying"
                    );
                    return Err(ExecutorError::Terminal { error, attempt });
                }
                AttemptOutcome::RetryableFailure(error) => AttemptError::Failed(error),
                AttemptOutcome::TimedOut => AttemptError::TimedOut {
                    duration: policy.attempt_timeout(),
                },
            };

            if attempt >= policy.max_attempts() {
                let elapsed = start.elapsed();
                warn!(
                    label = policy.label(),
                    attempts = attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = ?failure,
                    "retries exhausted"
                );
                return Err(ExecutorError::Exhausted(RetryExhausted::new(
                    failure, attempt, elapsed,
                )));
            }

            let delay = policy.backoff().jittered_delay(attempt);
            debug!(
                label = policy.label(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                timed_out = failure.is_timeout(),
                error = ?failure,
                "attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Like [`run`](Self::run), but substitutes `fallback` when retries are
    /// exhausted.
    ///
    /// Terminal failures and invalid policies still propagate: the fallback
    /// only covers transient conditions that failed to heal.
    pub async fn run_with_fallback<T, E, F, Fut>(
        &self,
        operation: F,
        policy: &RetryPolicy<E>,
        fallback: T,
    ) -> Result<T, ExecutorError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        self.run_with_fallback_fn(operation, policy, move |_| fallback)
            .await
    }

    /// Like [`run_with_fallback`](Self::run_with_fallback), computing the
    /// fallback lazily from the exhaustion record.
    pub async fn run_with_fallback_fn<T, E, F, Fut, G>(
        &self,
        operation: F,
        policy: &RetryPolicy<E>,
        fallback: G,
    ) -> Result<T, ExecutorError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
        G: FnOnce(RetryExhausted<AttemptError<E>>) -> T,
    {
        match self.run(operation, policy).await {
            Err(ExecutorError::Exhausted(exhausted)) => {
                warn!(
                    label = policy.label(),
                    attempts = exhausted.attempts,
                    error = ?exhausted.final_error,
                    "retries exhausted, returning fallback"
                );
                Ok(fallback(exhausted))
            }
            other => other,
        }
    }
}

/// Run one attempt under the policy's timeout and classify the result.
pub(crate) async fn attempt_once<T, E, F, Fut>(
    operation: &F,
    policy: &RetryPolicy<E>,
) -> AttemptOutcome<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(policy.attempt_timeout(), operation()).await {
        Ok(Ok(value)) => AttemptOutcome::Success(value),
        Ok(Err(error)) if policy.should_retry(&error) => AttemptOutcome::RetryableFailure(error),
        Ok(Err(error)) => AttemptOutcome::TerminalFailure(error),
        Err(_) => AttemptOutcome::TimedOut,
    }
}
