//! Export coordinator
//!
//! Wires a cursor session, the pump, the sink and the error aggregator
//! together, decides when to shut down, and makes sure the session's cursors
//! are released exactly once whatever the reason for stopping.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::session::ScrollSource;

use super::aggregator::{AggregatorReport, ErrorAggregator};
use super::backoff::Backoff;
use super::progress::ProgressTracker;
use super::pump::{Pump, PumpReport};
use super::sink::{Sink, SinkEnd, SinkReport};
use super::writer::RecordWriter;

/// Capacity of every pipeline channel: one item in flight between stages.
const CHANNEL_CAPACITY: usize = 1;

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Errors tolerated before aborting
    pub max_errors: u32,
    /// Time allowed for pump and sink to finish once shutdown starts
    pub drain_window: Duration,
    /// Stop after this many records (None for all)
    pub max_records: Option<u64>,
    /// Delay policy between failed continuations
    pub backoff: Backoff,
    /// Draw a progress bar on stderr
    pub progress_bar: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_errors: 10,
            drain_window: Duration::from_secs(90),
            max_records: None,
            backoff: Backoff::none(),
            progress_bar: false,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_errors: config.pipeline.max_errors,
            drain_window: config.drain_window(),
            max_records: config.pipeline.max_records,
            backoff: Backoff::from_config(&config.pipeline.retry),
            progress_bar: config.output.progress,
        }
    }
}

/// How an export ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The cursor was exhausted and every record reached the sink
    Completed,
    /// The record limit was reached
    LimitReached,
    /// Cancelled from outside (Ctrl+C)
    Cancelled,
    /// The error threshold was exceeded
    Fatal,
    /// Pump or sink did not finish within the drain window and were aborted
    DrainTimeout,
}

impl fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportOutcome::Completed => "completed",
            ExportOutcome::LimitReached => "record limit reached",
            ExportOutcome::Cancelled => "cancelled",
            ExportOutcome::Fatal => "aborted after too many errors",
            ExportOutcome::DrainTimeout => "drain window elapsed",
        };
        f.write_str(s)
    }
}

/// Result of an export
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub outcome: ExportOutcome,
    pub pump: PumpReport,
    pub sink: SinkReport,
    pub errors: AggregatorReport,
    /// Whether cursor cleanup succeeded
    pub released: bool,
    pub elapsed: Duration,
}

impl ExportSummary {
    pub fn records_written(&self) -> u64 {
        self.sink.written
    }
}

/// Coordinator for one export
pub struct ExportCoordinator {
    source: Arc<dyn ScrollSource>,
    writer: Box<dyn RecordWriter>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl ExportCoordinator {
    pub fn new(
        source: Arc<dyn ScrollSource>,
        writer: Box<dyn RecordWriter>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            writer,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one cancelled on Ctrl+C
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the export
    ///
    /// 1. Open the cursor (the only failure returned as `Err`)
    /// 2. Pump, sink and aggregator run until the cursor is exhausted, the
    ///    pipeline is cancelled, or the error threshold is exceeded
    /// 3. Cancel, wait for the stages within the drain window
    /// 4. Release every cursor once
    ///
    /// # Arguments
    /// * `query` - Query document; the source's default when `None`
    pub async fn execute(self, query: Option<Value>) -> Result<ExportSummary> {
        let start = Instant::now();
        let ExportCoordinator {
            source,
            writer,
            options,
            cancel,
        } = self;

        let query = query.unwrap_or_else(|| source.default_query());
        debug!("Query: {}", query);

        let seed = match source.open(&query).await {
            Ok(batch) => batch,
            Err(e) => {
                error!("error opening scroll: {}", e);
                release(source.as_ref()).await;
                return Err(e.into());
            }
        };

        let (record_tx, record_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (pump_err_tx, pump_err_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (sink_err_tx, sink_err_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let fatal = CancellationToken::new();

        let aggregator = ErrorAggregator::new(options.max_errors, fatal.clone());
        let aggregator_handle = tokio::spawn(aggregator.run(pump_err_rx, sink_err_rx));

        let sink = Sink::new(record_rx, sink_err_tx, writer, cancel.clone()).with_limit(options.max_records);
        let mut sink_handle = tokio::spawn(sink.run());

        let pump = Pump::new(source.clone(), record_tx, pump_err_tx, cancel.clone())
            .with_backoff(options.backoff.clone())
            .with_progress(ProgressTracker::new(source.total_hits(), options.progress_bar));
        let mut pump_handle = tokio::spawn(pump.run(seed));

        info!("Export started");

        let mut sink_result = None;
        tokio::select! {
            biased;
            _ = fatal.cancelled() => debug!("Shutdown triggered by error threshold"),
            _ = cancel.cancelled() => debug!("Shutdown triggered by cancellation"),
            res = &mut sink_handle => {
                debug!("Sink finished");
                sink_result = Some(res);
            }
        }

        // Stop feeding; in-flight records drain below.
        cancel.cancel();

        let deadline = tokio::time::Instant::now() + options.drain_window;
        let pump_result = tokio::time::timeout_at(deadline, &mut pump_handle).await;
        let sink_result = match sink_result.take() {
            Some(res) => Ok(res),
            None => tokio::time::timeout_at(deadline, &mut sink_handle).await,
        };

        let mut drain_timed_out = false;
        let pump_report = match pump_result {
            Ok(res) => joined("pump", res),
            Err(_) => {
                warn!("Pump did not stop within {:?}, aborting it", options.drain_window);
                pump_handle.abort();
                let _ = (&mut pump_handle).await;
                drain_timed_out = true;
                PumpReport::default()
            }
        };
        let sink_report = match sink_result {
            Ok(res) => joined("sink", res),
            Err(_) => {
                warn!("Sink did not drain within {:?}, aborting it", options.drain_window);
                sink_handle.abort();
                let _ = (&mut sink_handle).await;
                drain_timed_out = true;
                SinkReport::default()
            }
        };

        let errors = joined("error aggregator", aggregator_handle.await);
        let released = release(source.as_ref()).await;

        let outcome = if errors.fatal {
            ExportOutcome::Fatal
        } else if drain_timed_out {
            ExportOutcome::DrainTimeout
        } else if sink_report.end == SinkEnd::LimitReached {
            ExportOutcome::LimitReached
        } else if pump_report.exhausted && sink_report.end == SinkEnd::EndOfData {
            ExportOutcome::Completed
        } else {
            ExportOutcome::Cancelled
        };

        let summary = ExportSummary {
            outcome,
            pump: pump_report,
            sink: sink_report,
            errors,
            released,
            elapsed: start.elapsed(),
        };

        info!(
            "Export {}: {} records written, {} failed writes, {} pages, {} errors, {} ms",
            summary.outcome,
            summary.sink.written,
            summary.sink.failures,
            summary.pump.pages,
            summary.errors.total(),
            summary.elapsed.as_millis()
        );

        Ok(summary)
    }
}

/// Release the session's cursors; failures are logged, never escalated
async fn release(source: &dyn ScrollSource) -> bool {
    match source.release().await {
        Ok(body) => {
            if !body.is_empty() {
                debug!("Cleanup response: {}", String::from_utf8_lossy(&body));
            }
            true
        }
        Err(e) => {
            warn!("cleanup had error: {}", e);
            false
        }
    }
}

fn joined<T: Default>(stage: &str, result: std::result::Result<T, tokio::task::JoinError>) -> T {
    result.unwrap_or_else(|e| {
        error!("{} task failed: {}", stage, e);
        T::default()
    })
}
