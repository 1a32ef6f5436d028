//! Retry policy for conflicting store transactions.

use std::time::Duration;

use crate::error::AppError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(200);

/// Outcome of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Roll back, sleep, then run the whole body again.
    Retry(Duration),
    /// Conflict on the last allowed attempt.
    Exhausted,
    /// Non-retryable error; return it as is.
    Fail,
}

/// Maximum attempts and exponential backoff, injected into the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
}

impl RetryPolicy {
    /// A zero attempt count is raised to one.
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the zero-based `attempt` failed: base * 2^attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }

    /// Decide what to do after the zero-based `attempt` failed with `err`.
    pub fn decide(&self, attempt: u32, err: &AppError) -> RetryDecision {
        if !err.is_retryable() {
            return RetryDecision::Fail;
        }
        if attempt + 1 >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry(self.backoff_for(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_BACKOFF)
    }
}
