//! Retry logic with exponential backoff
//!
//! Transient fetch failures (network hiccups, tool crashes) are retried with
//! exponential backoff and optional jitter. Waiting between attempts observes
//! the task's cancellation token.

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            // yt-dlp reports throttling and dropped connections through its exit status
            FetchError::ToolFailed { stderr, .. } => {
                let stderr = stderr.to_ascii_lowercase();
                stderr.contains("timed out")
                    || stderr.contains("connection")
                    || stderr.contains("http error 429")
                    || stderr.contains("http error 5")
                    || stderr.contains("temporary")
            }
            FetchError::Spawn(_)
            | FetchError::MalformedOutput(_)
            | FetchError::Unavailable(_)
            | FetchError::Cancelled => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// Returns [`FetchError::Cancelled`] without further attempts once `cancel`
/// fires during a backoff wait.
pub async fn fetch_with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "fetch succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "fetch failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }

                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt + 1, "fetch failed after all retry attempts");
                } else {
                    tracing::debug!(error = %e, "fetch failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay)
}

/// Uniform jitter between 0% and 100% of `delay`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
