//! Retry with exponential backoff for provider calls.
//!
//! Delays double from a base up to a cap with no jitter. Only transient
//! failures are retried: rate limits, 5xx-class statuses, connect errors and
//! timeouts. Client-side 4xx failures return immediately.

use crate::core::config::{OpenAiConfig, RetryConfig};
use crate::services::provider::ProviderError;
use std::future::Future;
use std::time::Duration;

/// HTTP statuses worth another attempt.
pub const RETRYABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

/// HTTP statuses that never succeed on retry.
pub const NON_RETRYABLE_STATUS_CODES: &[u16] = &[400, 401, 403, 404, 422];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(openai: &OpenAiConfig, retry: &RetryConfig) -> Self {
        Self {
            max_attempts: openai.max_retries.max(1),
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
        }
    }

    /// Delay before the attempt following `attempt` (0-based): `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Whether an error is transient and the call should be retried.
pub fn is_retryable(error: &ProviderError) -> bool {
    match error {
        ProviderError::Http { status, .. } => RETRYABLE_STATUS_CODES.contains(status),
        ProviderError::Timeout | ProviderError::Connect(_) => true,
        _ => false,
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// Exhausting the attempts on a retryable error yields
/// [`ProviderError::RetryExhausted`] wrapping the last error.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Err(ProviderError::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable provider error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
