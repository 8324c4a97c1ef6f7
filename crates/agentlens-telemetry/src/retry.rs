//! Retry policy shared by every delivery path
//!
//! The policy is a pure decision function; callers own the suspension
//! primitive (the client sleeps with `tokio::time::sleep`).

use std::time::Duration;

use crate::error::ApiError;

/// Exponential backoff: `min(base * 2^attempt, max)`
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub backoff_base: Duration,
    /// Upper bound for a computed backoff delay
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Wait for the given delay, then try again
    RetryAfter(Duration),
    /// Surface the error to the caller
    GiveUp,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `attempt + 1` (attempt is 0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(63) as i32);
        let delay = self.backoff_base.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.backoff_max.as_secs_f64()))
    }

    /// Decide whether attempt `attempt` (0-based) that failed with `error`
    /// should be retried.
    pub fn decide(&self, attempt: u32, error: &ApiError) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }

        match error {
            ApiError::RateLimited {
                retry_after: Some(secs),
                ..
            } if *secs > 0.0 => RetryDecision::RetryAfter(
                // Server hints beyond the cap (or unrepresentable) wait the cap
                Duration::try_from_secs_f64(*secs)
                    .map_or(self.backoff_max, |d| d.min(self.backoff_max)),
            ),
            _ => RetryDecision::RetryAfter(self.backoff(attempt)),
        }
    }
}
