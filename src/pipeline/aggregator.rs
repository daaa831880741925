//! Error aggregation across the pump and the sink

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::ScrollError;

/// Pipeline stage an error was reported by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pump,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pump => write!(f, "scroll pump"),
            Stage::Sink => write!(f, "record sink"),
        }
    }
}

/// Result of observing one error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Tolerated,
    /// This error pushed the count past the threshold.
    Fatal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorReport {
    pub pump_errors: u32,
    pub sink_errors: u32,
    pub fatal: bool,
}

impl AggregatorReport {
    pub fn total(&self) -> u32 {
        self.pump_errors + self.sink_errors
    }
}

/// Counts errors from both stages and trips the fatal token once the count
/// strictly exceeds the threshold
///
/// The kind of error does not matter, only how many there have been.
pub struct ErrorAggregator {
    threshold: u32,
    fatal: CancellationToken,
    report: AggregatorReport,
}

impl ErrorAggregator {
    pub fn new(threshold: u32, fatal: CancellationToken) -> Self {
        Self {
            threshold,
            fatal,
            report: AggregatorReport::default(),
        }
    }

    pub fn observe(&mut self, stage: Stage, err: &ScrollError) -> Verdict {
        match stage {
            Stage::Pump => self.report.pump_errors += 1,
            Stage::Sink => self.report.sink_errors += 1,
        }
        let count = self.report.total();

        warn!(kind = err.kind(), "error returned from {}: {} [{}]", stage, err, count);

        if count > self.threshold && !self.report.fatal {
            error!(
                "max number of errors exceeded ({} > {}), aborting export",
                count, self.threshold
            );
            self.report.fatal = true;
            self.fatal.cancel();
            return Verdict::Fatal;
        }
        Verdict::Tolerated
    }

    /// Merge both error channels until every reporter has hung up
    ///
    /// Keeps draining after going fatal so no reporter blocks on a send.
    pub async fn run(
        mut self,
        mut pump: mpsc::Receiver<ScrollError>,
        mut sink: mpsc::Receiver<ScrollError>,
    ) -> AggregatorReport {
        let mut pump_open = true;
        let mut sink_open = true;

        while pump_open || sink_open {
            tokio::select! {
                err = pump.recv(), if pump_open => match err {
                    Some(e) => {
                        self.observe(Stage::Pump, &e);
                    }
                    None => pump_open = false,
                },
                err = sink.recv(), if sink_open => match err {
                    Some(e) => {
                        self.observe(Stage::Sink, &e);
                    }
                    None => sink_open = false,
                },
            }
        }

        self.report
    }
}
