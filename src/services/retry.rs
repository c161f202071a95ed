//! Retry with exponential backoff and a per-attempt timeout for capability
//! calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;
use crate::domain::ports::CapabilityError;

/// Retry policy for handling transient capability errors.
///
/// Backoff doubles with each retry up to `max_backoff_ms`. Only errors for
/// which [`CapabilityError::is_transient`] holds are retried; a timeout of a
/// single attempt counts as transient.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.initial_backoff_ms, config.max_backoff_ms)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(initial_backoff_ms),
        }
    }

    /// No retries and no waiting; used by tests.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Run `operation`, bounding each attempt by `attempt_timeout`.
    ///
    /// Gives up with [`CapabilityError::RetriesExhausted`] once transient
    /// failures use up every attempt; a permanent error is returned as is.
    pub async fn execute<F, Fut, T>(
        &self,
        attempt_timeout: Duration,
        mut operation: F,
    ) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let mut attempt = 0;

        loop {
            let outcome = match timeout(attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Timeout(attempt_timeout.as_secs())),
            };

            match outcome {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "capability call succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(err) if !err.is_transient() => {
                    debug!(error = %err, "permanent capability error, not retrying");
                    return Err(err);
                }
                Err(err) if attempt >= self.max_retries => {
                    warn!(attempts = attempt + 1, error = %err, "capability call gave up");
                    return Err(CapabilityError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient capability error, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Exponential backoff: initial * 2^attempt, capped.
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(backoff_ms)
    }
}
