//! Execute an async operation with retries.

use std::future::Future;
use std::time::Duration;

use crate::domain::PipelineError;

use super::policy::RetryPolicy;

/// Passed to the `on_retry` callback before each backoff sleep.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub error: &'a PipelineError,
    pub delay: Duration,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up.
///
/// - Non-retryable errors are returned as-is, right away.
/// - Exhaustion returns [`PipelineError::RetriesExhausted`] wrapping the last
///   error.
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: Option<&mut (dyn FnMut(&RetryEvent<'_>) + Send)>,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.is_retryable() {
            return Err(error);
        }
        if attempt >= max_attempts {
            tracing::warn!(attempts = attempt, error = %error, "retries exhausted");
            return Err(PipelineError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        // ThreadRng is !Send; keep it out of the await below.
        let delay = {
            let mut rng = rand::thread_rng();
            policy.delay_for(attempt, &mut rng)
        };

        if let Some(callback) = on_retry.as_deref_mut() {
            callback(&RetryEvent {
                attempt,
                error: &error,
                delay,
            });
        }
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
