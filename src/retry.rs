//! Static retry policy for cache connections.
//!
//! Connection-level errors and timeouts are retried twice with exponential
//! backoff. The policy is fixed; callers cannot tune it per operation.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff with a fixed retry budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub cap: Duration,
}

impl RetryPolicy {
    /// The policy every cache adapter uses.
    pub const STATIC: RetryPolicy = RetryPolicy {
        retries: 2,
        base: Duration::from_millis(8),
        cap: Duration::from_millis(512),
    };

    /// Attempts per operation: the first try plus every retry.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Run `operation`, retrying connection errors (and timeouts when
    /// `retry_on_timeout` is set) up to `self.retries` times.
    ///
    /// # Errors
    /// Returns the last error once the budget is spent, or the first
    /// non-retryable error immediately.
    pub async fn run<T, F, Fut>(&self, retry_on_timeout: bool, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retryable = e.is_retryable() && (retry_on_timeout || !e.is_timeout());
                    if !retryable || attempts >= max_attempts {
                        return Err(e);
                    }

                    let delay = self.backoff(attempts);
                    debug!(
                        "Cache operation failed (attempt {}/{}), retrying in {:?}: {}",
                        attempts, max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::STATIC
    }
}
