//! Exponential backoff for remote fetches.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::remote::FetchError;

/// Longest wait between two attempts, whatever the policy says
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Backoff schedule for retrying transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
  /// Delay before the first retry
  pub initial_delay: Duration,
  /// Factor applied to the delay after every retry
  pub multiplier: f64,
  /// Retries after the first attempt (total attempts = max_retries + 1)
  pub max_retries: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      initial_delay: Duration::from_millis(1000),
      multiplier: 2.0,
      max_retries: 2,
    }
  }
}

impl RetryPolicy {
  /// Delay before retry number `retry` (0-based), capped at
  /// [`MAX_RETRY_DELAY`].
  pub fn delay_for(&self, retry: u32) -> Duration {
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
    Duration::try_from_secs_f64(secs)
      .map(|delay| delay.min(MAX_RETRY_DELAY))
      .unwrap_or(MAX_RETRY_DELAY)
  }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the retry
/// budget is spent. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(
  policy: &RetryPolicy,
  mut op: F,
) -> Result<T, FetchError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, FetchError>>,
{
  let mut retry = 0;
  loop {
    match op().await {
      Ok(value) => {
        if retry > 0 {
          info!(attempts = retry + 1, "Fetch succeeded after retry");
        }
        return Ok(value);
      }
      Err(err) if err.is_retryable() && retry < policy.max_retries => {
        let delay = policy.delay_for(retry);
        warn!(
          attempt = retry + 1,
          delay_ms = delay.as_millis() as u64,
          error = %err,
          "Fetch failed, backing off"
        );
        tokio::time::sleep(delay).await;
        retry += 1;
      }
      Err(err) => {
        if err.is_retryable() {
          warn!(attempts = retry + 1, error = %err, "Retry limit exhausted");
        }
        return Err(err);
      }
    }
  }
}
