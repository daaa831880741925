//! The sink: single consumer of the record channel

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ScrollError;
use crate::session::Record;

use super::writer::RecordWriter;

/// Why the sink stopped consuming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkEnd {
    /// The producer closed the channel
    #[default]
    EndOfData,
    /// The pipeline was cancelled; buffered records were drained
    Cancelled,
    /// The configured record limit was reached
    LimitReached,
}

/// What the sink did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Records received from the channel
    pub received: u64,
    /// Records written successfully
    pub written: u64,
    /// Failed writes (each record is attempted exactly once)
    pub failures: u64,
    pub end: SinkEnd,
}

pub struct Sink {
    records: mpsc::Receiver<Record>,
    errors: mpsc::Sender<ScrollError>,
    writer: Box<dyn RecordWriter>,
    cancel: CancellationToken,
    limit: Option<u64>,
    report: SinkReport,
}

impl Sink {
    pub fn new(
        records: mpsc::Receiver<Record>,
        errors: mpsc::Sender<ScrollError>,
        writer: Box<dyn RecordWriter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            records,
            errors,
            writer,
            cancel,
            limit: None,
            report: SinkReport::default(),
        }
    }

    /// Stop, and cancel the pipeline, once `limit` records have been received
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|l| self.report.received >= l)
    }

    /// Consume until the channel closes, the pipeline is cancelled or the
    /// record limit is hit
    pub async fn run(mut self) -> SinkReport {
        let end = loop {
            if self.limit_reached() {
                info!("Record limit of {} reached", self.report.received);
                self.cancel.cancel();
                break SinkEnd::LimitReached;
            }

            tokio::select! {
                biased;
                next = self.records.recv() => match next {
                    Some(record) => self.write(record).await,
                    None => break SinkEnd::EndOfData,
                },
                _ = self.cancel.cancelled() => break SinkEnd::Cancelled,
            }
        };

        if end == SinkEnd::Cancelled {
            // Refuse new sends, then write what is already buffered.
            self.records.close();
            while let Some(record) = self.records.recv().await {
                if self.limit_reached() {
                    break;
                }
                self.write(record).await;
            }
        }

        if let Err(e) = self.writer.finalize().await {
            self.report.failures += 1;
            let _ = self.errors.send(e).await;
        }

        self.report.end = end;
        debug!(
            "Sink stopped ({:?}): {} written, {} failed",
            end, self.report.written, self.report.failures
        );
        self.report
    }

    async fn write(&mut self, record: Record) {
        self.report.received += 1;
        match self.writer.write_record(&record).await {
            Ok(_) => self.report.written += 1,
            Err(e) => {
                self.report.failures += 1;
                // The aggregator drains until every reporter is gone.
                let _ = self.errors.send(e).await;
            }
        }
    }
}
