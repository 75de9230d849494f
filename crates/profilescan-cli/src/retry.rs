//! Retry with exponential back-off for scan submissions.
//!
//! Only [`ClientError::is_transient`] failures are retried. The schedule is
//! deterministic: with the default policy the waits are 1 s then 2 s, so a
//! third attempt starts no earlier than 3 s after the first.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based): `base × 2^(attempt-1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Runs `operation` until it succeeds, fails permanently, runs out of
/// attempts, or `cancel` fires.
///
/// `operation` receives the 1-based attempt number.
///
/// # Errors
///
/// Returns the last error from `operation`, or [`ClientError::Cancelled`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = operation(attempt) => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient scan failure; retrying after back-off"
                );
                tokio::select! {
                    () = cancel.cancelled() => return Err(ClientError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
