//! Delay policy between failed continuation attempts

use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential backoff: starts at `initial`, grows by `multiplier` after each
/// consecutive failure, never exceeds `max`, and starts over after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            multiplier: multiplier.max(1.0),
            next: initial,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.multiplier,
        )
    }

    /// Backoff that never waits
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Delay to wait after the current failure
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let grown = (self.next.as_millis() as f64 * self.multiplier).round() as u64;
        self.next = Duration::from_millis(grown).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}
