//! # Reconnect Backoff
//!
//! Exponential delay between reconnect attempts: `initial * 2^attempt`,
//! capped at `max`. Retries never give up.

use std::time::Duration;

/// Default first delay
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default delay cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential reconnect backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Forget past failures
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Failed attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// First delay
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Delay cap
    pub fn max(&self) -> Duration {
        self.max
    }
}
