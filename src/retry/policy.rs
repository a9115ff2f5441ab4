//! Retry policy types and configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::classify::{is_transient_backend_error, is_transient_network_error, Classify};
use super::error::PolicyError;

/// Classifier deciding whether a failure is worth another attempt.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// A retry policy describing how to retry failed operations.
///
/// Policies are data: they describe retry behavior but never execute it. The
/// [`ResilientExecutor`](super::ResilientExecutor) reads a policy on every
/// call, so one policy can be shared across many calls.
///
/// `max_attempts` counts every attempt, including the first. A policy with
/// `max_attempts == 1` never retries, whatever its predicate says.
///
/// # Examples
///
/// ```rust
/// use holdfast::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::<std::io::Error>::exponential(Duration::from_millis(100))
///     .with_max_attempts(3)
///     .with_backoff_factor(2.0)
///     .with_max_delay(Duration::from_secs(1))
///     .with_attempt_timeout(Duration::from_secs(5))
///     .with_label("fetch_event");
///
/// assert_eq!(policy.max_attempts(), 3);
/// assert!(policy.validate().is_ok());
/// ```
pub struct RetryPolicy<E> {
    backoff: Backoff,
    max_attempts: u32,
    attempt_timeout: Duration,
    retry_if: Option<RetryPredicate<E>>,
    label: String,
}

/// Exponential backoff schedule with a ceiling and optional jitter.
///
/// The un-jittered delay after failed attempt `n` (1-indexed) is
/// `initial_delay * factor^(n - 1)`, clamped to `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Multiplicative growth per attempt. Must be greater than 1.0.
    pub factor: f64,
    /// Ceiling for every computed delay, jittered or not.
    pub max_delay: Duration,
    /// Randomisation applied on top of the computed delay.
    pub jitter: JitterStrategy,
}

/// Strategy for adding randomness to delays.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JitterStrategy {
    /// No jitter applied.
    None,
    /// Multiply the delay by a uniform sample from `[1 - f, 1 + f]`.
    Proportional(f64),
    /// `Proportional(0.15)`: multiplier in `[0.85, 1.15]`.
    #[default]
    Standard,
}

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_FACTOR: f64 = 2.0;
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LABEL: &str = "operation";

impl<E> RetryPolicy<E> {
    /// Create a policy with exponential backoff starting at `initial_delay`.
    ///
    /// Defaults: 3 attempts, factor 2.0, 30s delay ceiling, 30s per-attempt
    /// timeout, ±15% jitter, retry on every failure.
    pub fn exponential(initial_delay: Duration) -> Self {
        Self {
            backoff: Backoff {
                initial_delay,
                factor: DEFAULT_FACTOR,
                max_delay: DEFAULT_MAX_DELAY,
                jitter: JitterStrategy::Standard,
            },
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retry_if: None,
            label: DEFAULT_LABEL.to_string(),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn once() -> Self {
        Self::exponential(Duration::ZERO).with_max_attempts(1)
    }

    /// Set the total number of attempts, including the first.
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay after the first failed attempt.
    pub fn with_initial_delay(mut self, d: Duration) -> Self {
        self.backoff.initial_delay = d;
        self
    }

    /// Set the multiplicative growth per attempt.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff.factor = factor;
        self
    }

    /// Set the maximum delay cap.
    ///
    /// Delays never exceed this value, jitter included.
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.backoff.max_delay = d;
        self
    }

    /// Abort (and count as timed out) any attempt running longer than `d`.
    pub fn with_attempt_timeout(mut self, d: Duration) -> Self {
        self.attempt_timeout = d;
        self
    }

    /// Add proportional jitter: the delay is multiplied by a sample from
    /// `[1 - factor, 1 + factor]`. The factor is clamped to `[0.0, 1.0]`.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.backoff.jitter = JitterStrategy::Proportional(factor.clamp(0.0, 1.0));
        self
    }

    /// Disable jitter so delays follow the exact exponential schedule.
    pub fn without_jitter(mut self) -> Self {
        self.backoff.jitter = JitterStrategy::None;
        self
    }

    /// Only retry failures for which `predicate` returns true.
    ///
    /// Timeouts are always retried and never reach the predicate.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Name used in log events. Has no effect on behavior.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Get the total number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get the per-attempt timeout.
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Get the backoff schedule.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Get the observability label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether `error` should be retried. Defaults to true without a predicate.
    pub fn should_retry(&self, error: &E) -> bool {
        self.retry_if.as_ref().is_none_or(|p| p(error))
    }

    /// Check the policy's invariants.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if !self.backoff.factor.is_finite() || self.backoff.factor <= 1.0 {
            return Err(PolicyError::BackoffFactor(self.backoff.factor));
        }
        if self.attempt_timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        Ok(())
    }
}

impl<E: Classify + 'static> RetryPolicy<E> {
    /// Policy for calls crossing the network: retries timeouts, refused or
    /// reset connections, unavailable or overloaded peers and internal errors.
    pub fn network() -> Self {
        Self::exponential(Duration::from_millis(200))
            .with_max_attempts(4)
            .with_max_delay(Duration::from_secs(5))
            .with_attempt_timeout(Duration::from_secs(15))
            .with_label("network")
            .retry_if(is_transient_network_error::<E>)
    }

    /// Policy for managed-backend calls: retries everything the network policy
    /// does, plus transactions the backend aborted.
    pub fn backend() -> Self {
        Self::exponential(Duration::from_millis(500))
            .with_max_attempts(5)
            .with_max_delay(Duration::from_secs(10))
            .with_attempt_timeout(Duration::from_secs(20))
            .with_label("backend")
            .retry_if(is_transient_backend_error::<E>)
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(200))
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            backoff: self.backoff.clone(),
            max_attempts: self.max_attempts,
            attempt_timeout: self.attempt_timeout,
            retry_if: self.retry_if.clone(),
            label: self.label.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("label", &self.label)
            .field("max_attempts", &self.max_attempts)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("backoff", &self.backoff)
            .field("has_predicate", &self.retry_if.is_some())
            .finish()
    }
}

impl Backoff {
    /// Un-jittered delay after failed attempt `attempt` (1-indexed).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use holdfast::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::<()>::exponential(Duration::from_millis(100))
    ///     .with_max_delay(Duration::from_millis(500));
    /// let backoff = policy.backoff();
    ///
    /// assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
    /// assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
    /// assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(400));
    /// assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(500)); // capped
    /// ```
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        clamp_secs(self.raw_secs(attempt), self.max_delay)
    }

    /// Delay after failed attempt `attempt` with jitter applied.
    ///
    /// The multiplier scales the uncapped schedule and the cap is applied
    /// last, so once the schedule is past `max_delay` the result is exactly
    /// `max_delay`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.jitter.sample_multiplier();
        clamp_secs(self.raw_secs(attempt) * multiplier, self.max_delay)
    }

    fn raw_secs(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.initial_delay.as_secs_f64() * self.factor.powi(exponent)
    }
}

impl JitterStrategy {
    /// Half-width of the multiplier range.
    pub fn spread(&self) -> f64 {
        match self {
            JitterStrategy::None => 0.0,
            JitterStrategy::Proportional(f) => f.clamp(0.0, 1.0),
            JitterStrategy::Standard => 0.15,
        }
    }

    /// Draw one multiplier from `[1 - spread, 1 + spread]`.
    pub fn sample_multiplier(&self) -> f64 {
        let spread = self.spread();
        if spread == 0.0 {
            return 1.0;
        }
        use rand::Rng;
        rand::rng().random_range((1.0 - spread)..=(1.0 + spread))
    }
}

fn clamp_secs(secs: f64, max: Duration) -> Duration {
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        max
    } else if secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(secs)
    }
}
