//! Exponential reconnect backoff.

use std::time::Duration;

/// Reconnect policy: `delay(n) = min(base * 2^n, max)`, with no attempt
/// scheduled once `n` reaches `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl Backoff {
    /// Creates a policy.
    #[must_use]
    pub const fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }

    /// Delay before reconnect number `attempt` (zero-based), ignoring the
    /// attempt cap.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        1_u32
            .checked_shl(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay for the next reconnect given `attempts` already scheduled, or
    /// `None` once the cap is reached.
    #[must_use]
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        (attempts < self.max_attempts).then(|| self.delay(attempts))
    }

    /// Maximum number of reconnects.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
