//! Batch execution with partial retry.

use std::fmt::Debug;
use std::future::Future;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::{AttemptError, ExecutorError, PolicyError, RetryExhausted};
use super::executor::{attempt_once, AttemptOutcome, ResilientExecutor};
use super::policy::RetryPolicy;

/// Per-operation results of [`ResilientExecutor::run_batch`], aligned with the input.
pub type BatchResults<T, E> = Vec<Result<T, ExecutorError<E>>>;

impl ResilientExecutor {
    /// Run independent operations concurrently, retrying only the ones that
    /// fail retryably.
    ///
    /// Every round runs its members concurrently and waits for all of them.
    /// Rounds share a single attempt counter and backoff schedule: the delay
    /// before round `n + 1` is the policy's delay after attempt `n`. An
    /// operation that succeeds is never invoked again; a terminal failure is
    /// recorded immediately and leaves the remaining rounds.
    ///
    /// Only an invalid policy fails the call as a whole. Member failures are
    /// reported in their own slot.
    ///
    /// # Example
    ///
    /// ```rust
    /// use holdfast::{ResilientExecutor, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// # tokio_test::block_on(async {
    /// let policy = RetryPolicy::<String>::exponential(Duration::from_millis(1));
    /// let ops: Vec<_> = (1..=3)
    ///     .map(|n| move || async move { Ok::<_, String>(n * 10) })
    ///     .collect();
    ///
    /// let results = ResilientExecutor::new().run_batch(ops, &policy).await.unwrap();
    /// assert_eq!(results, vec![Ok(10), Ok(20), Ok(30)]);
    /// # });
    /// ```
    pub async fn run_batch<T, E, F, Fut>(
        &self,
        operations: Vec<F>,
        policy: &RetryPolicy<E>,
    ) -> Result<BatchResults<T, E>, PolicyError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        policy.validate()?;

        let start = Instant::now();
        let total = operations.len();
        let mut slots: Vec<Option<Result<T, ExecutorError<E>>>> =
            std::iter::repeat_with(|| None).take(total).collect();
        let mut pending: Vec<usize> = (0..total).collect();
        let mut round = 1u32;

        while !pending.is_empty() {
            let outcomes = join_all(
                pending
                    .iter()
                    .map(|&index| attempt_once(&operations[index], policy)),
            )
            .await;

            let mut failed: Vec<(usize, AttemptError<E>)> = Vec::new();
            for (index, outcome) in pending.iter().copied().zip(outcomes) {
                match outcome {
                    AttemptOutcome::Success(value) => slots[index] = Some(Ok(value)),
                    AttemptOutcome::TerminalFailure(error) => {
                        warn!(
                            label = policy.label(),
                            index,
                            round,
                            error = ?error,
                            "batch member failed terminally"
                        );
                        slots[index] = Some(Err(ExecutorError::Terminal {
                            error,
                            attempt: round,
                        }));
                    }
                    AttemptOutcome::RetryableFailure(error) => {
                        failed.push((index, AttemptError::Failed(error)))
                    }
                    AttemptOutcome::TimedOut => failed.push((
                        index,
                        AttemptError::TimedOut {
                            duration: policy.attempt_timeout(),
                        },
                    )),
                }
            }

            if failed.is_empty() {
                break;
            }

            if round >= policy.max_attempts() {
                let elapsed = start.elapsed();
                warn!(
                    label = policy.label(),
                    rounds = round,
                    exhausted = failed.len(),
                    total,
                    "batch retries exhausted"
                );
                for (index, error) in failed {
                    slots[index] = Some(Err(ExecutorError::Exhausted(RetryExhausted::new(
                        error, round, elapsed,
                    ))));
                }
                break;
            }

            let delay = policy.backoff().jittered_delay(round);
            debug!(
                label = policy.label(),
                round,
                retrying = failed.len(),
                total,
                delay_ms = delay.as_millis() as u64,
                "batch round had failures, backing off"
            );
            tokio::time::sleep(delay).await;

            pending = failed.into_iter().map(|(index, _)| index).collect();
            round += 1;
        }

        let results: BatchResults<T, E> = slots.into_iter().flatten().collect();
        debug_assert_eq!(results.len(), total);
        Ok(results)
    }
}
