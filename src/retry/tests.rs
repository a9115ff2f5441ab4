//! Integration tests for retry functionality.

use super::*;
use crate::testing::ScriptedOperation;
use crate::{assert_exhausted, assert_terminal};
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;
use tracing_test::traced_test;

fn unavailable() -> BackendError {
    BackendError::new(ErrorKind::Unavailable, "service unavailable")
}

fn denied() -> BackendError {
    BackendError::new(ErrorKind::PermissionDenied, "permission denied")
}

#[tokio::test(start_paused = true)]
async fn test_recovers_on_third_attempt_after_backoff() {
    let op = ScriptedOperation::new("profile").failing_first(2, unavailable());
    let policy = RetryPolicy::backend()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(100))
        .with_backoff_factor(2.0)
        .with_max_delay(Duration::from_millis(1000))
        .with_attempt_timeout(Duration::from_secs(5));

    let start = Instant::now();
    let result = ResilientExecutor::new().run(|| op.call(), &policy).await;

    assert_eq!(result, Ok("profile"));
    assert_eq!(op.calls(), 3);
    // 100ms + 200ms, each jittered down by at most 15%
    assert!(start.elapsed() >= Duration::from_millis(255));
    assert!(start.elapsed() <= Duration::from_millis(350));
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_operation_runs_exactly_max_attempts() {
    for max_attempts in 1..=6 {
        let op = ScriptedOperation::new(()).failing_first(u32::MAX, unavailable());
        let policy = RetryPolicy::backend()
            .with_initial_delay(Duration::from_millis(10))
            .with_max_attempts(max_attempts);

        let result = ResilientExecutor::new().run(|| op.call(), &policy).await;

        assert_exhausted!(result, max_attempts);
        assert_eq!(op.calls(), max_attempts);
    }
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_short_circuits() {
    let op = ScriptedOperation::new(()).failing_first(u32::MAX, denied());
    let policy = RetryPolicy::backend().with_max_attempts(10);

    let result = ResilientExecutor::new().run(|| op.call(), &policy).await;

    assert_terminal!(result, 1);
    assert_eq!(op.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_only_after_exhaustion() {
    let executor = ResilientExecutor::new();
    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_attempts(4);

    let flaky = ScriptedOperation::new(1).failing_first(u32::MAX, unavailable());
    let result = executor.run_with_fallback(|| flaky.call(), &policy, 0).await;
    assert_eq!(result, Ok(0));
    assert_eq!(flaky.calls(), 4);

    let forbidden = ScriptedOperation::new(1).failing_first(u32::MAX, denied());
    let result = executor.run_with_fallback(|| forbidden.call(), &policy, 0).await;
    assert_terminal!(result);
    assert_eq!(forbidden.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_retry_even_when_predicate_rejects_everything() {
    let op = ScriptedOperation::<_, &str>::new("late")
        .stalling_first(2, Duration::from_secs(60));
    let policy = RetryPolicy::exponential(Duration::from_millis(50))
        .with_attempt_timeout(Duration::from_secs(1))
        .retry_if(|_| false);

    let result = ResilientExecutor::new().run(|| op.call(), &policy).await;

    assert_eq!(result, Ok("late"));
    assert_eq!(op.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_by_timeouts_reports_timeout() {
    let op =
        ScriptedOperation::<_, &str>::new(()).stalling_first(u32::MAX, Duration::from_secs(60));
    let policy = RetryPolicy::exponential(Duration::from_millis(50))
        .with_max_attempts(2)
        .with_attempt_timeout(Duration::from_millis(500));

    match ResilientExecutor::new().run(|| op.call(), &policy).await {
        Err(ExecutorError::Exhausted(exhausted)) => {
            assert!(exhausted.final_error.is_timeout());
            assert_eq!(exhausted.attempts, 2);
        }
        other => panic!("expected timeout exhaustion, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_retries_only_failed_members() {
    let ops: Vec<_> = (1..=4u32)
        .map(|i| ScriptedOperation::new(i).failing_first(i - 1, unavailable()))
        .collect();
    let factories: Vec<_> = ops
        .iter()
        .map(|op| {
            let op = op.clone();
            move || op.call()
        })
        .collect();
    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_attempts(4);

    let results = ResilientExecutor::new()
        .run_batch(factories, &policy)
        .await
        .unwrap();

    assert_eq!(results, vec![Ok(1), Ok(2), Ok(3), Ok(4)]);
    let calls: Vec<u32> = ops.iter().map(ScriptedOperation::calls).collect();
    assert_eq!(calls, vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_batch_short_budget_leaves_slow_members_exhausted() {
    let ops: Vec<_> = (1..=3u32)
        .map(|i| ScriptedOperation::new(i).failing_first(i - 1, unavailable()))
        .collect();
    let factories: Vec<_> = ops
        .iter()
        .map(|op| {
            let op = op.clone();
            move || op.call()
        })
        .collect();
    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_attempts(2);

    let results = ResilientExecutor::new()
        .run_batch(factories, &policy)
        .await
        .unwrap();

    assert_eq!(results[0], Ok(1));
    assert_eq!(results[1], Ok(2));
    assert!(results[2].as_ref().is_err_and(ExecutorError::is_exhausted));
    assert_eq!(ops[2].calls(), 2);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_attempts_are_logged_with_label() {
    let op = ScriptedOperation::new(()).failing_first(1, unavailable());
    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(10))
        .with_label("sync_inbox");

    ResilientExecutor::new()
        .run(|| op.call(), &policy)
        .await
        .unwrap();

    assert!(logs_contain("attempt failed, backing off"));
    assert!(logs_contain("sync_inbox"));
    assert!(logs_contain("delay_ms"));
    assert!(logs_contain("operation recovered after retry"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_fallback_use_is_logged() {
    let op = ScriptedOperation::new(5).failing_first(u32::MAX, unavailable());
    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_attempts(2);

    let value = ResilientExecutor::new()
        .run_with_fallback(|| op.call(), &policy, 0)
        .await;

    assert_eq!(value, Ok(0));
    assert!(logs_contain("returning fallback"));
}

proptest! {
    #[test]
    fn prop_attempt_count_matches_budget(max_attempts in 1u32..8, fail_first in 0u32..10) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let op = ScriptedOperation::new(()).failing_first(fail_first, unavailable());
            let policy = RetryPolicy::backend()
                .with_initial_delay(Duration::from_millis(1))
                .with_max_attempts(max_attempts);

            let result = ResilientExecutor::new().run(|| op.call(), &policy).await;

            if fail_first < max_attempts {
                prop_assert!(result.is_ok());
                prop_assert_eq!(op.calls(), fail_first + 1);
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(op.calls(), max_attempts);
            }
            Ok(())
        })?;
    }
}
