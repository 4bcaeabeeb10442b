//! Retry policy with exponential backoff and additive jitter.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::Config;

/// Outcome of a retried operation that never succeeded.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; holds the last one.
    #[error("retry exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The operation failed with an error the caller marked non-retryable.
    #[error("{0}")]
    Aborted(E),
}

/// Bounded-attempt retry with exponential backoff.
///
/// Before attempt `k + 1` (for `k` in `1..attempts`) the policy sleeps for
/// `min(max_delay, base_delay * 2^(k-1)) + U(0, jitter)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Example
    /// ```
    /// use llm_task_runner::services::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(
    ///     3,
    ///     Duration::from_millis(300),
    ///     Duration::from_secs(2),
    ///     Duration::from_millis(200),
    /// );
    /// assert_eq!(policy.max_attempts(), 3);
    /// ```
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter,
        }
    }

    /// Build the policy from the `retry_*` configuration knobs.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_secs_f64(config.retry_base_delay),
            Duration::from_secs_f64(config.retry_max_delay),
            Duration::from_secs_f64(config.retry_jitter),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails non-retryably, or runs out of
    /// attempts.
    pub async fn execute<F, Fut, T, E, P>(&self, mut operation: F, is_retryable: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) if !is_retryable(&err) => {
                    debug!(attempt, error = %err, "Non-retryable error, not retrying");
                    return Err(RetryError::Aborted(err));
                }
                Err(err) if attempt >= self.max_attempts => {
                    warn!(attempts = attempt, error = %err, "Operation failed on every attempt");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    let backoff = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        ?backoff,
                        "Attempt failed, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Deterministic part of the delay after attempt `attempt` (1-based).
    ///
    /// Formula: min(base_delay * 2^(attempt-1), max_delay)
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// Full delay after attempt `attempt`, jitter included.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            let secs = rand::rng().random_range(0.0..=self.jitter.as_secs_f64());
            Duration::from_secs_f64(secs)
        };
        self.exponential_delay(attempt) + jitter
    }
}
