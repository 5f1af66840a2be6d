// Bounded retry with linear backoff, used while a stream waits for its renditions.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::StartRetryPolicy;
use crate::error::PoolError;

impl StartRetryPolicy {
    /// Delay after the `attempt`-th attempt (1-indexed). No jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    Success(T),
    /// Try again after the backoff delay.
    Retry(PoolError),
    /// Give up immediately.
    Fail(PoolError),
}

#[derive(Debug)]
pub enum RetryFailure {
    /// Every attempt asked for a retry.
    Exhausted { attempts: u32, last_error: PoolError },
    /// An attempt failed permanently, or the token was cancelled.
    Aborted(PoolError),
}

/// Runs `operation` up to `policy.max_attempts` times.
///
/// The closure receives the 1-indexed attempt number.
pub async fn retry_linear<F, Fut, T>(
    policy: &StartRetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, RetryFailure>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut attempt = 1;
    loop {
        if token.is_cancelled() {
            return Err(RetryFailure::Aborted(PoolError::Cancelled));
        }

        let action = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RetryFailure::Aborted(PoolError::Cancelled)),
            action = operation(attempt) => action,
        };

        match action {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(RetryFailure::Aborted(err)),
            RetryAction::Retry(err) => {
                if attempt >= policy.max_attempts {
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                let delay = policy.delay_for_attempt(attempt);
                debug!(
                    attempt,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying"
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(RetryFailure::Aborted(PoolError::Cancelled));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
