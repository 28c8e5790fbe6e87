use std::time::Duration;

use reqwest::StatusCode;

/// Bounded exponential backoff for transient API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt.
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_millis(500),
      max_delay: Duration::from_secs(8),
    }
  }
}

impl RetryPolicy {
  /// A policy that never retries.
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      ..Self::default()
    }
  }

  /// Delay before retry number `attempt` (0-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  /// Rate limits and server errors are worth another attempt.
  pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
  }

  /// Connection failures and timeouts are worth another attempt.
  pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_delay_doubles_and_caps() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.delay(0), Duration::from_millis(500));
    assert_eq!(policy.delay(1), Duration::from_secs(1));
    assert_eq!(policy.delay(2), Duration::from_secs(2));
    assert_eq!(policy.delay(10), Duration::from_secs(8));
    assert_eq!(policy.delay(64), Duration::from_secs(8));
  }

  #[test]
  fn test_retryable_statuses() {
    assert!(RetryPolicy::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
    assert!(RetryPolicy::is_retryable_status(StatusCode::BAD_GATEWAY));
    assert!(!RetryPolicy::is_retryable_status(StatusCode::BAD_REQUEST));
    assert!(!RetryPolicy::is_retryable_status(StatusCode::UNAUTHORIZED));
  }
}
