//! The pump: turns repeated cursor continuations into a record stream

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ScrollError;
use crate::session::{Record, ScrollSource};

use super::backoff::Backoff;
use super::progress::ProgressTracker;

/// Pump lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Running,
    /// Terminal: an empty batch was received and the output was closed.
    Closed,
}

/// What the pump did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Non-empty batches received from continuations
    pub pages: u64,
    /// Records accepted by the consumer, seed batch included
    pub records: u64,
    /// Failed continuations
    pub failures: u64,
    /// Whether the cursor was exhausted (as opposed to cancelled)
    pub exhausted: bool,
}

/// Single producer of the record channel
///
/// Forwards the seed batch, then calls `continue_scroll` until an empty batch
/// comes back or the pipeline is cancelled. Failures go to the error channel
/// and the loop carries on after a backoff delay; deciding when there have
/// been too many is not the pump's job.
pub struct Pump<S: ?Sized> {
    source: Arc<S>,
    records: mpsc::Sender<Record>,
    errors: mpsc::Sender<ScrollError>,
    cancel: CancellationToken,
    backoff: Backoff,
    progress: ProgressTracker,
    state: PumpState,
    report: PumpReport,
}

impl<S: ScrollSource + ?Sized> Pump<S> {
    pub fn new(
        source: Arc<S>,
        records: mpsc::Sender<Record>,
        errors: mpsc::Sender<ScrollError>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            records,
            errors,
            cancel,
            backoff: Backoff::none(),
            progress: ProgressTracker::new(None, false),
            state: PumpState::Running,
            report: PumpReport::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    /// Run until the cursor is exhausted or the pipeline is cancelled
    ///
    /// Consumes the pump; dropping it closes the record channel.
    pub async fn run(mut self, seed: Vec<Record>) -> PumpReport {
        debug!("Pump started with {} seed records", seed.len());

        if self.forward(seed).await {
            self.pump_loop().await;
        }

        self.progress.finish();
        self.report.records = self.progress.done();
        self.report.exhausted = self.state == PumpState::Closed;
        debug!(
            "Pump stopped: {} records, {} pages, {} failures",
            self.report.records, self.report.pages, self.report.failures
        );
        self.report
    }

    async fn pump_loop(&mut self) {
        while self.state == PumpState::Running {
            if self.cancel.is_cancelled() {
                debug!("Pump cancelled, no further continuations");
                return;
            }

            match self.source.continue_scroll().await {
                Ok(batch) if batch.is_empty() => {
                    info!("Cursor exhausted after {} records", self.progress.done());
                    self.state = PumpState::Closed;
                }
                Ok(batch) => {
                    self.report.pages += 1;
                    self.backoff.reset();
                    if !self.forward(batch).await {
                        return;
                    }
                }
                Err(e) => {
                    self.report.failures += 1;
                    if !self.report_error(e).await || !self.wait_backoff().await {
                        return;
                    }
                }
            }
        }
    }

    /// Push records in order, one at a time
    ///
    /// Returns false when the pipeline was cancelled or the consumer is gone.
    async fn forward(&mut self, batch: Vec<Record>) -> bool {
        for record in batch {
            let started = Instant::now();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                sent = self.records.send(record) => {
                    if sent.is_err() {
                        debug!("Record consumer went away");
                        return false;
                    }
                }
            }
            self.progress.record_sent(started.elapsed());
        }
        true
    }

    /// Hand an error to the aggregator; logged here when it cannot be
    async fn report_error(&mut self, error: ScrollError) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(kind = error.kind(), "error returned from scroll pump after shutdown: {}", error);
                false
            }
            permit = self.errors.reserve() => match permit {
                Ok(permit) => {
                    permit.send(error);
                    true
                }
                Err(_) => {
                    warn!(kind = error.kind(), "error returned from scroll pump with no aggregator: {}", error);
                    false
                }
            },
        }
    }

    async fn wait_backoff(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        if delay.is_zero() {
            return true;
        }
        debug!("Retrying continuation in {:?}", delay);
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ReplaySource;

    fn pump(cancel: CancellationToken) -> (Pump<ReplaySource>, mpsc::Receiver<ScrollError>) {
        let source = Arc::new(ReplaySource::new("/nonexistent/dump.jsonl", "dump", 1));
        let (records, _) = mpsc::channel(1);
        let (errors, errors_rx) = mpsc::channel(1);
        (Pump::new(source, records, errors, cancel), errors_rx)
    }

    #[tokio::test]
    async fn test_report_error_reaches_aggregator() {
        let (mut pump, mut errors) = pump(CancellationToken::new());

        assert!(pump.report_error(ScrollError::TimedOut).await);
        assert_eq!(errors.recv().await, Some(ScrollError::TimedOut));
    }

    #[tokio::test]
    async fn test_report_error_after_shutdown_is_not_forwarded() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (mut pump, mut errors) = pump(cancel);

        assert!(!pump.report_error(ScrollError::TimedOut).await);
        drop(pump);
        assert_eq!(errors.recv().await, None);
    }

    #[tokio::test]
    async fn test_report_error_without_aggregator() {
        let (mut pump, errors) = pump(CancellationToken::new());
        drop(errors);

        assert!(!pump.report_error(ScrollError::NotOpened).await);
    }
}
