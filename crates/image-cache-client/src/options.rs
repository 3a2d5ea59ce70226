//! Per-request options and retry policy

use image_blob_cache::CacheError;
use std::time::Duration;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Options for [`crate::CacheClientAdapter::request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Rendered when loading fails; defaults to the source URL itself
    pub fallback_url: Option<String>,
    /// Only warm the cache, leave adapter state alone
    pub preload: bool,
    /// Total attempts, the first one included
    pub retry_attempts: u32,
    /// Base backoff delay, doubled after every failed attempt
    pub retry_delay: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            fallback_url: None,
            preload: false,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RequestOptions {
    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            base_delay: self.retry_delay,
        }
    }
}

/// Exponential backoff: attempt `n` (zero-based) that fails waits
/// `base_delay * 2^n` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Whether the failure of zero-based `attempt` earns another try
    pub fn should_retry(&self, error: &CacheError, attempt: u32) -> bool {
        error.is_retryable() && attempt + 1 < self.attempts
    }
}
