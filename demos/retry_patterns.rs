//! Retry Patterns Example
//!
//! Demonstrates the resilient executor:
//! - Basic retry with exponential backoff
//! - Terminal errors that short-circuit retries
//! - Per-attempt timeouts
//! - Fallback values after exhaustion
//! - Batch execution with partial retry
//!
//! Run with: cargo run --example retry_patterns

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use holdfast::retry::{BackendError, ErrorKind};
use holdfast::{ExecutorError, ResilientExecutor, RetryPolicy};

// ==================== Basic Retry ====================

/// Example 1: an operation that fails twice, then succeeds.
async fn example_basic_retry(executor: &ResilientExecutor) {
    println!("\n=== Example 1: Basic Retry ===");

    let attempts = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(100))
        .with_label("load_profile");

    let result = executor
        .run(
            || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    println!("  Attempt {}", n);
                    if n < 3 {
                        Err(BackendError::new(ErrorKind::Unavailable, "replica warming up"))
                    } else {
                        Ok("profile:42")
                    }
                }
            },
            &policy,
        )
        .await;

    println!("Result: {:?}", result);
}

// ==================== Terminal Errors ====================

/// Example 2: a permission error is never retried.
async fn example_terminal(executor: &ResilientExecutor) {
    println!("\n=== Example 2: Terminal Errors ===");

    let policy = RetryPolicy::backend().with_label("delete_account");
    let result = executor
        .run(
            || async {
                println!("  Attempt");
                Err::<(), _>(BackendError::new(ErrorKind::PermissionDenied, "not an admin"))
            },
            &policy,
        )
        .await;

    if let Err(ExecutorError::Terminal { error, attempt }) = result {
        println!("Gave up on attempt {}: {}", attempt, error);
    }
}

// ==================== Timeouts ====================

/// Example 3: the first attempt hangs and is cut off by the per-attempt timeout.
async fn example_timeout(executor: &ResilientExecutor) {
    println!("\n=== Example 3: Per-attempt Timeout ===");

    let attempts = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(50))
        .with_attempt_timeout(Duration::from_millis(200))
        .with_label("slow_query");

    let result = executor
        .run(
            || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        println!("  Attempt 1 hangs");
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    Ok::<_, BackendError>("rows")
                }
            },
            &policy,
        )
        .await;

    println!("Result after {} attempts: {:?}", attempts.load(Ordering::SeqCst), result);
}

// ==================== Fallback ====================

/// Example 4: serve a default once retries run out.
async fn example_fallback(executor: &ResilientExecutor) {
    println!("\n=== Example 4: Fallback ===");

    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(20))
        .with_max_attempts(3)
        .with_label("recommendations");

    let value = executor
        .run_with_fallback(
            || async { Err(BackendError::new(ErrorKind::ResourceExhausted, "rate limited")) },
            &policy,
            Vec::<String>::new(),
        )
        .await;

    println!("Recommendations: {:?}", value);
}

// ==================== Batch ====================

/// Example 5: only the failing members of a batch are retried.
async fn example_batch(executor: &ResilientExecutor) {
    println!("\n=== Example 5: Batch Partial Retry ===");

    let counters: Vec<Arc<AtomicU32>> = (0..3).map(|_| Arc::new(AtomicU32::new(0))).collect();
    let operations: Vec<_> = counters
        .iter()
        .enumerate()
        .map(|(i, calls)| {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
                    if n < i {
                        Err(BackendError::new(ErrorKind::Timeout, "upload stalled"))
                    } else {
                        Ok(format!("chunk-{}", i))
                    }
                }
            }
        })
        .collect();

    let policy = RetryPolicy::backend()
        .with_initial_delay(Duration::from_millis(20))
        .with_label("upload_chunks");

    match executor.run_batch(operations, &policy).await {
        Ok(results) => {
            for (i, (result, calls)) in results.iter().zip(&counters).enumerate() {
                println!(
                    "  chunk {}: {:?} after {} call(s)",
                    i,
                    result,
                    calls.load(Ordering::SeqCst)
                );
            }
        }
        Err(e) => println!("Invalid policy: {}", e),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("======================================");
    println!("       Retry Patterns Example         ");
    println!("======================================");

    let executor = ResilientExecutor::new();
    example_basic_retry(&executor).await;
    example_terminal(&executor).await;
    example_timeout(&executor).await;
    example_fallback(&executor).await;
    example_batch(&executor).await;

    println!("\n======================================");
    println!("           Examples Complete           ");
    println!("======================================");
}
