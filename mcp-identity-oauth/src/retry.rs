//! Retry policy for transport-level and retriable HTTP failures.
//!
//! Backoff is exponential with full jitter, capped at `max_delay`; the
//! original request body is never resent after a protocol-level error —
//! only the call boundary retries, and only for errors `is_retriable()`.

use crate::error::OAuthError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(20));
        let capped = exp.min(self.max_delay.as_millis());
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered as u64)
    }

    /// Run `op` up to `max_attempts` times, retrying only on
    /// `OAuthError::is_retriable()` errors, sleeping with full jitter
    /// between attempts.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, OAuthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OAuthError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retriable() && attempt + 1 < self.max_attempts => {
                    tracing::warn!(attempt, error = %err, "retriable OAuth call failed, backing off");
                    tokio::time::sleep(self.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
