//! Bounded exponential backoff for transient failures

use std::future::Future;
use std::time::Duration;

use ferry_core::error::OperationError;
use tracing::warn;

/// Retry policy for operations and pipeline stages
///
/// Only `OperationError::Transient` is retried. The delay doubles after each
/// failed attempt and is capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `f` until it succeeds, fails permanently or attempts run out
    ///
    /// `on_attempt` is called with the attempt number before each attempt.
    /// Returns the final result together with the number of attempts made.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        mut on_attempt: impl FnMut(u32),
        mut f: F,
    ) -> (Result<T, OperationError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            on_attempt(attempt);

            match f().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label, attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}
