//! Export pipeline
//!
//! Streams every record behind a cursor to an output, one record in flight at
//! a time.
//!
//! # Architecture
//!
//! 1. **Pump**: single producer; forwards the first batch, then keeps calling
//!    `continue_scroll` until an empty batch comes back
//! 2. **Sink**: single consumer; writes each record exactly once
//! 3. **ErrorAggregator**: counts failures from both stages and trips a fatal
//!    token once there have been too many
//!
//! The **ExportCoordinator** opens the cursor, runs the three stages, decides
//! when to shut down and releases the cursors once at the end.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scrollpump::config::OutputConfig;
//! use scrollpump::pipeline::{ExportCoordinator, PipelineOptions, open_output};
//! use scrollpump::session::ReplaySource;
//!
//! # async fn run() -> scrollpump::error::Result<()> {
//! let source = Arc::new(ReplaySource::new("dump.jsonl", "logs", 500));
//! let writer = open_output(&OutputConfig::default()).await?;
//!
//! let summary = ExportCoordinator::new(source, writer, PipelineOptions::default())
//!     .execute(None)
//!     .await?;
//! println!("{} records", summary.records_written());
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod backoff;
pub mod coordinator;
pub mod progress;
pub mod pump;
pub mod sink;
pub mod writer;

pub use aggregator::{AggregatorReport, ErrorAggregator};
pub use backoff::Backoff;
pub use coordinator::{ExportCoordinator, ExportOutcome, ExportSummary, PipelineOptions};
pub use progress::ProgressTracker;
pub use pump::{Pump, PumpReport};
pub use sink::{Sink, SinkEnd, SinkReport};
pub use writer::{RecordWriter, StreamWriter, open_output};

#[cfg(test)]
mod tests;
