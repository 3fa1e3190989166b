//! Exponential backoff for failed attempts.

use std::time::Duration;

/// Outcome of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after `delay`
    Retry { delay: Duration },

    /// Attempts are exhausted
    Terminal,
}

/// Retry policy implementing exponential backoff.
///
/// `delay = base_delay * 2^(attempts - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Cap for exponential growth
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self { base_delay, max_delay }
    }

    /// Decide what happens after a failure.
    ///
    /// `attempts` is the count after including the attempt that just failed.
    pub fn decide(&self, attempts: u32, max_attempts: u32) -> RetryDecision {
        if attempts >= max_attempts {
            RetryDecision::Terminal
        } else {
            RetryDecision::Retry { delay: self.delay(attempts) }
        }
    }

    /// Backoff before the attempt following `attempts` failures.
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
        }
    }
}
