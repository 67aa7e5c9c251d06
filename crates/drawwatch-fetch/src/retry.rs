//! Bounded retries with a fixed backoff and a per-attempt deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// Deadline for each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. An attempt that overruns its deadline is dropped
    /// and counts as a failed attempt.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => FetchError::Timeout(self.attempt_timeout),
            };
            if attempt >= attempts || !err.is_retryable() {
                return Err(err);
            }
            warn!(what, attempt, max = attempts, error = %err, "fetch attempt failed, retrying");
            tokio::time::sleep(self.backoff).await;
            attempt += 1;
        }
    }
}
