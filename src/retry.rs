//! Bounded retry with exponential backoff
//!
//! A [`RetryPolicy`] is plain configuration: it holds no counters, so one
//! instance can wrap any number of concurrent operations. Attempt counters
//! live in the call.
//!
//! The policy does not look at the error it receives. Call sites decide what
//! is worth wrapping: validation and configuration failures are terminal and
//! must be checked before entering a retried operation.
//!
//! Cancellation of the async variant is the usual future cancellation: once
//! the returned future is dropped (timeout, aborted task, closed connection)
//! no further attempt is started, including while it is parked in a backoff
//! sleep.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Wait before the first retry
    pub delay: Duration,
    /// Multiplier applied to the wait after each failed attempt (>= 1)
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            delay,
            backoff_factor: if backoff_factor.is_finite() {
                backoff_factor.max(1.0)
            } else {
                1.0
            },
        }
    }

    /// General purpose preset: 2 retries, 0.5s, doubling
    pub fn on_failure() -> Self {
        Self::new(2, Duration::from_millis(500), 2.0)
    }

    /// Preset for calls to the registry: 3 retries, 1s, x1.5
    pub fn network() -> Self {
        Self::new(3, Duration::from_secs(1), 1.5)
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    /// Total number of invocations before giving up
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait after the failed attempt `attempt` (0-indexed):
    /// `delay * backoff_factor^attempt`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run an async operation, retrying on error.
    ///
    /// Returns the first success, or the last error once every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    let wait = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "Attempt {} failed for {}: {}. Retrying in {:?}",
                        attempt + 1,
                        operation,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        operation,
                        attempts = attempt + 1,
                        "All {} attempts failed for {}: {}",
                        attempt + 1,
                        operation,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Blocking counterpart of [`RetryPolicy::run`]; sleeps the current thread
    /// between attempts.
    pub fn run_blocking<T, E, F>(&self, operation: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    let wait = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "Attempt {} failed for {}: {}. Retrying in {:?}",
                        attempt + 1,
                        operation,
                        e,
                        wait
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        operation,
                        attempts = attempt + 1,
                        "All {} attempts failed for {}: {}",
                        attempt + 1,
                        operation,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::on_failure()
    }
}
