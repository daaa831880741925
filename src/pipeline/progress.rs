//! Progress tracking for the pump
//!
//! Logs a throughput line at a growing interval so long exports stay visible
//! without flooding logs nobody is watching, and optionally draws a progress
//! bar on stderr.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const INITIAL_LOG_INTERVAL: Duration = Duration::from_secs(10);
const LOG_INTERVAL_STEP: Duration = Duration::from_secs(15);
const MAX_LOG_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// A send that waited longer than this on the consumer counts as blocked.
pub const BLOCKED_THRESHOLD: Duration = Duration::from_secs(1);

/// Progress tracker owned by the pump
pub struct ProgressTracker {
    total: Option<u64>,
    done: u64,
    since_log: u64,
    blocked: u64,
    last_log: Instant,
    log_interval: Duration,
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `total` - Total number of records if known
    /// * `enable_bar` - Whether to display a progress bar
    pub fn new(total: Option<u64>, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| match total {
            Some(n) => {
                let bar = ProgressBar::new(n);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {pos} records {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        });

        Self {
            total,
            done: 0,
            since_log: 0,
            blocked: 0,
            last_log: Instant::now(),
            log_interval: INITIAL_LOG_INTERVAL,
            bar,
        }
    }

    /// Account for one record handed to the sink after waiting `waited`
    pub fn record_sent(&mut self, waited: Duration) {
        self.done += 1;
        self.since_log += 1;
        if waited > BLOCKED_THRESHOLD {
            self.blocked += 1;
        }
        if let Some(ref bar) = self.bar {
            bar.set_position(self.done);
        }
        self.maybe_log(Instant::now());
    }

    /// Emit the throughput line if the log interval has elapsed at `now`
    ///
    /// Returns whether a line was logged.
    fn maybe_log(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_log);
        if elapsed < self.log_interval {
            return false;
        }

        let rate = self.since_log / elapsed.as_secs().max(1);
        let total = self
            .total
            .map_or_else(|| "?".to_string(), |t| t.to_string());
        info!(
            "{} / {} records scrolled ({} per second; {} blocked)",
            self.done, total, rate, self.blocked
        );
        if let Some(ref bar) = self.bar {
            bar.set_message(format!("({rate} records/sec)"));
        }

        self.last_log = now;
        self.since_log = 0;
        self.blocked = 0;
        if self.log_interval < MAX_LOG_INTERVAL {
            self.log_interval = (self.log_interval + LOG_INTERVAL_STEP).min(MAX_LOG_INTERVAL);
        }
        true
    }

    /// Records handed to the sink so far
    pub fn done(&self) -> u64 {
        self.done
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_blocked() {
        let mut tracker = ProgressTracker::new(Some(10), false);
        tracker.record_sent(Duration::ZERO);
        tracker.record_sent(Duration::from_secs(2));

        assert_eq!(tracker.done(), 2);
        assert_eq!(tracker.blocked, 1);
    }

    #[test]
    fn test_log_interval_grows() {
        let mut tracker = ProgressTracker::new(None, false);
        let start = tracker.last_log;

        assert!(!tracker.maybe_log(start + Duration::from_secs(5)));
        assert!(tracker.maybe_log(start + Duration::from_secs(10)));
        assert_eq!(tracker.log_interval, Duration::from_secs(25));

        // Counters for the window are cleared after each line.
        assert_eq!(tracker.since_log, 0);
        assert!(!tracker.maybe_log(start + Duration::from_secs(30)));
        assert!(tracker.maybe_log(start + Duration::from_secs(35)));
    }

    #[test]
    fn test_log_interval_is_capped() {
        let mut tracker = ProgressTracker::new(None, false);
        tracker.log_interval = MAX_LOG_INTERVAL;
        let at = tracker.last_log + MAX_LOG_INTERVAL;
        assert!(tracker.maybe_log(at));
        assert_eq!(tracker.log_interval, MAX_LOG_INTERVAL);
    }
}
