//! Error types for resilient execution.

use std::time::Duration;

/// Error returned when all attempts are exhausted.
///
/// Contains the final error along with metadata about the retry sequence.
///
/// # Examples
///
/// ```rust
/// use holdfast::{AttemptError, ExecutorError, ResilientExecutor, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::exponential(Duration::from_millis(1))
///     .with_max_attempts(3);
///
/// let result = ResilientExecutor::new()
///     .run(|| async { Err::<(), _>("always fails") }, &policy)
///     .await;
///
/// match result {
///     Err(ExecutorError::Exhausted(exhausted)) => {
///         assert_eq!(exhausted.final_error, AttemptError::Failed("always fails"));
///         assert_eq!(exhausted.attempts, 3);
///     }
///     _ => panic!("Expected exhaustion"),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// The error from the final attempt.
    pub final_error: E,
    /// Total number of attempts made.
    pub attempts: u32,
    /// Total time spent, first attempt to last failure.
    pub total_duration: Duration,
}

impl<E> RetryExhausted<E> {
    /// Create a new RetryExhausted error.
    pub fn new(final_error: E, attempts: u32, total_duration: Duration) -> Self {
        Self {
            final_error,
            attempts,
            total_duration,
        }
    }

    /// Extract the final error, discarding metadata.
    pub fn into_error(self) -> E {
        self.final_error
    }

    /// Get a reference to the final error.
    pub fn error(&self) -> &E {
        &self.final_error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "retry exhausted after {} attempts ({:?}): {}",
            self.attempts, self.total_duration, self.final_error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.final_error)
    }
}

/// Why a single attempt failed.
///
/// Either the operation itself returned an error, or it did not finish
/// within the policy's per-attempt timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// The operation returned an error.
    Failed(E),
    /// The attempt exceeded its timeout.
    TimedOut {
        /// The timeout duration that was exceeded.
        duration: Duration,
    },
}

impl<E> AttemptError<E> {
    /// Returns true if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Get the operation's error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::TimedOut { .. } => None,
        }
    }

    /// Borrow the operation's error if present.
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::TimedOut { .. } => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::TimedOut { duration } => write!(f, "attempt timed out after {:?}", duration),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AttemptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(e) => Some(e),
            Self::TimedOut { .. } => None,
        }
    }
}

/// A policy that violates its invariants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyError {
    /// `max_attempts` was zero.
    ZeroAttempts,
    /// `backoff_factor` was not a finite number greater than 1.0.
    BackoffFactor(f64),
    /// The per-attempt timeout was zero.
    ZeroTimeout,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroAttempts => {
                write!(f, "invalid retry policy: max_attempts must be at least 1")
            }
            Self::BackoffFactor(factor) => write!(
                f,
                "invalid retry policy: backoff_factor must be greater than 1.0, got {}",
                factor
            ),
            Self::ZeroTimeout => {
                write!(f, "invalid retry policy: attempt timeout must be non-zero")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Failure of a resilient execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorError<E> {
    /// The retry predicate rejected the error; no further attempts were made.
    Terminal {
        /// The operation's error.
        error: E,
        /// The attempt that produced it (1-indexed).
        attempt: u32,
    },
    /// Every attempt failed with a retryable error or timed out.
    Exhausted(RetryExhausted<AttemptError<E>>),
    /// The policy was rejected before any attempt ran.
    InvalidPolicy(PolicyError),
}

impl<E> ExecutorError<E> {
    /// Returns true for a predicate-rejected failure.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    /// Returns true when retries ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// The operation's own error, if the failure carries one.
    ///
    /// `None` for an invalid policy or an exhaustion whose last attempt
    /// timed out.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Terminal { error, .. } => Some(error),
            Self::Exhausted(exhausted) => exhausted.into_error().into_inner(),
            Self::InvalidPolicy(_) => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for ExecutorError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal { error, attempt } => {
                write!(f, "terminal failure on attempt {}: {}", attempt, error)
            }
            Self::Exhausted(exhausted) => write!(f, "{}", exhausted),
            Self::InvalidPolicy(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ExecutorError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Terminal { error, .. } => Some(error),
            Self::Exhausted(exhausted) => Some(exhausted),
            Self::InvalidPolicy(e) => Some(e),
        }
    }
}

impl<E> From<PolicyError> for ExecutorError<E> {
    fn from(e: PolicyError) -> Self {
        Self::InvalidPolicy(e)
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_retry_exhausted_display() {
        let err = RetryExhausted::new("connection failed", 3, Duration::from_millis(500));
        let display = format!("{}", err);
        assert!(display.contains("retry exhausted"));
        assert!(display.contains("3 attempts"));
        assert!(display.contains("connection failed"));
    }

    #[test]
    fn test_retry_exhausted_into_error() {
        let err = RetryExhausted::new("test error", 5, Duration::from_secs(1));
        assert_eq!(err.error(), &"test error");
        assert_eq!(err.into_error(), "test error");
    }

    #[test]
    fn test_attempt_error_timeout() {
        let err: AttemptError<String> = AttemptError::TimedOut {
            duration: Duration::from_secs(5),
        };
        assert!(err.is_timeout());
        assert!(err.inner().is_none());
        assert!(format!("{}", err).contains("timed out"));
        assert!(err.into_inner().is_none());
    }

    #[test]
    fn test_attempt_error_failed() {
        let err = AttemptError::Failed("inner error".to_string());
        assert!(!err.is_timeout());
        assert_eq!(format!("{}", err), "inner error");
        assert_eq!(err.into_inner(), Some("inner error".to_string()));
    }

    #[test]
    fn test_executor_error_into_inner() {
        let terminal: ExecutorError<&str> = ExecutorError::Terminal {
            error: "denied",
            attempt: 1,
        };
        assert!(terminal.is_terminal());
        assert_eq!(terminal.into_inner(), Some("denied"));

        let exhausted: ExecutorError<&str> = ExecutorError::Exhausted(RetryExhausted::new(
            AttemptError::TimedOut {
                duration: Duration::from_millis(10),
            },
            2,
            Duration::from_millis(30),
        ));
        assert!(exhausted.is_exhausted());
        assert_eq!(exhausted.into_inner(), None);

        let invalid: ExecutorError<&str> = PolicyError::ZeroAttempts.into();
        assert!(format!("{}", invalid).contains("max_attempts"));
    }
}
