//! Bounded exponential-backoff retry built on the `backoff` crate.
//!
//! Budgets are bounded twice: by attempt count and by total elapsed time.
//! Whichever runs out first ends the loop and the last error is returned.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::future::retry_notify;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;
use crate::infrastructure::vector::errors::IndexRequestError;

/// Errors that know whether another attempt may succeed.
pub trait Retryable: std::fmt::Display {
    fn is_transient(&self) -> bool;
}

impl Retryable for IndexRequestError {
    fn is_transient(&self) -> bool {
        Self::is_transient(self)
    }
}

impl Retryable for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;

        matches!(
            self.kind(),
            ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
        )
    }
}

/// Retry policy with exponential backoff and jitter.
///
/// Delay for attempt `n` is `initial * 2^n`, capped at `max_backoff`, then
/// randomized by `jitter`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    max_elapsed: Duration,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_elapsed: Duration::from_millis(config.max_elapsed_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            ..Self::default()
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// Un-jittered delay before retry number `attempt` (0-indexed).
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(self.jitter)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }

    /// Run `operation` until it succeeds, fails permanently, or the budget
    /// is spent.
    ///
    /// Non-transient errors return immediately without another attempt.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let attempts = AtomicU32::new(0);
        let max_retries = self.max_retries;

        let result = retry_notify(
            self.schedule(),
            || {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed);
                let fut = operation();
                async move {
                    fut.await.map_err(|err| {
                        if err.is_transient() && attempt < max_retries {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
                }
            },
            |err: E, delay: Duration| {
                warn!(
                    operation = operation_name,
                    attempt = attempts.load(Ordering::Relaxed),
                    max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
            },
        )
        .await;

        if let Err(err) = &result {
            debug!(
                operation = operation_name,
                attempts = attempts.load(Ordering::Relaxed),
                error = %err,
                "Giving up"
            );
        }
        result
    }
}
