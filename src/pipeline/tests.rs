use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::error::ScrollError;
use crate::session::{Record, ScrollSource};

fn rec(n: usize) -> Record {
    Record::new(n.to_string(), "logs", "", format!("{{\"n\":{n}}}").into_bytes())
}

fn recs(range: std::ops::RangeInclusive<usize>) -> Vec<Record> {
    range.map(rec).collect()
}

fn conn_refused() -> ScrollError {
    ScrollError::Connection("connection refused".into())
}

/// Source that plays back a fixed script of continuation results
struct ScriptedSource {
    open: Mutex<Option<Result<Vec<Record>, ScrollError>>>,
    script: Mutex<VecDeque<Result<Vec<Record>, ScrollError>>>,
    /// Once the script runs out, keep returning one-record batches
    endless: bool,
    next_id: AtomicUsize,
    continues: AtomicUsize,
    releases: AtomicUsize,
}

impl ScriptedSource {
    fn new(open: Result<Vec<Record>, ScrollError>, script: Vec<Result<Vec<Record>, ScrollError>>) -> Self {
        Self {
            open: Mutex::new(Some(open)),
            script: Mutex::new(script.into()),
            endless: false,
            next_id: AtomicUsize::new(1000),
            continues: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    fn endless(mut self) -> Self {
        self.endless = true;
        self
    }

    fn continues(&self) -> usize {
        self.continues.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScrollSource for ScriptedSource {
    async fn open(&self, _query: &serde_json::Value) -> Result<Vec<Record>, ScrollError> {
        self.open.lock().unwrap().take().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn continue_scroll(&self) -> Result<Vec<Record>, ScrollError> {
        self.continues.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            return step;
        }
        if self.endless {
            Ok(vec![rec(self.next_id.fetch_add(1, Ordering::SeqCst))])
        } else {
            Ok(Vec::new())
        }
    }

    async fn release(&self) -> Result<Vec<u8>, ScrollError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(b"{\"succeeded\":true}".to_vec())
    }
}

#[derive(Clone, Copy)]
enum WriteMode {
    Accept,
    Fail,
    Hang,
}

/// Writer that keeps every record it was given
struct RecordingWriter {
    records: Arc<Mutex<Vec<Record>>>,
    mode: WriteMode,
}

impl RecordingWriter {
    fn new(mode: WriteMode) -> (Self, Arc<Mutex<Vec<Record>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                records: records.clone(),
                mode,
            },
            records,
        )
    }
}

#[async_trait]
impl RecordWriter for RecordingWriter {
    async fn write_record(&mut self, record: &Record) -> Result<usize, ScrollError> {
        match self.mode {
            WriteMode::Accept => {
                self.records.lock().unwrap().push(record.clone());
                Ok(record.payload.len())
            }
            WriteMode::Fail => Err(ScrollError::Write("disk full".into())),
            WriteMode::Hang => std::future::pending().await,
        }
    }

    async fn finalize(&mut self) -> Result<(), ScrollError> {
        Ok(())
    }
}

fn options() -> PipelineOptions {
    PipelineOptions {
        max_errors: 10,
        drain_window: Duration::from_secs(5),
        max_records: None,
        backoff: Backoff::none(),
        progress_bar: false,
    }
}

async fn export(
    source: Arc<ScriptedSource>,
    mode: WriteMode,
    options: PipelineOptions,
) -> (ExportSummary, Vec<Record>) {
    let (writer, records) = RecordingWriter::new(mode);
    let summary = ExportCoordinator::new(source, Box::new(writer), options)
        .execute(Some(json!({"query": {"match_all": {}}})))
        .await
        .unwrap();
    let written = records.lock().unwrap().clone();
    (summary, written)
}

#[tokio::test]
async fn test_all_records_delivered_in_order() {
    let source = Arc::new(ScriptedSource::new(
        Ok(recs(1..=2)),
        vec![Ok(recs(3..=4)), Ok(recs(5..=5)), Ok(Vec::new())],
    ));

    let (summary, written) = export(source.clone(), WriteMode::Accept, options()).await;

    assert_eq!(summary.outcome, ExportOutcome::Completed);
    assert_eq!(summary.records_written(), 5);
    let ids: Vec<&str> = written.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["1", "2", "3", "4", "5"]);

    assert_eq!(source.continues(), 3);
    assert_eq!(source.releases(), 1);
    assert!(summary.released);
    assert_eq!(summary.pump.pages, 2);
    assert_eq!(summary.pump.records, 5);
    assert!(summary.pump.exhausted);
    assert_eq!(summary.errors.total(), 0);
}

#[tokio::test]
async fn test_empty_first_batch_still_continues() {
    let source = Arc::new(ScriptedSource::new(Ok(Vec::new()), vec![Ok(recs(1..=1))]));

    let (summary, written) = export(source.clone(), WriteMode::Accept, options()).await;

    assert_eq!(summary.outcome, ExportOutcome::Completed);
    assert_eq!(written.len(), 1);
    assert_eq!(source.continues(), 2);
}

#[tokio::test]
async fn test_empty_payload_is_not_end_of_data() {
    let empty = Record::new("2", "logs", "", Vec::new());
    let source = Arc::new(ScriptedSource::new(
        Ok(vec![rec(1), empty.clone()]),
        vec![Ok(recs(3..=3))],
    ));

    let (summary, written) = export(source, WriteMode::Accept, options()).await;

    assert_eq!(summary.outcome, ExportOutcome::Completed);
    assert_eq!(written.len(), 3);
    assert_eq!(written[1], empty);
}

#[tokio::test]
async fn test_transient_errors_are_tolerated() {
    let source = Arc::new(ScriptedSource::new(
        Ok(recs(1..=1)),
        vec![
            Err(conn_refused()),
            Err(ScrollError::TimedOut),
            Err(conn_refused()),
            Ok(recs(2..=3)),
        ],
    ));

    let (summary, written) = export(source.clone(), WriteMode::Accept, options()).await;

    assert_eq!(summary.outcome, ExportOutcome::Completed);
    assert_eq!(written.len(), 3);
    assert_eq!(summary.errors.pump_errors, 3);
    assert!(!summary.errors.fatal);
    assert_eq!(summary.pump.failures, 3);
    assert_eq!(source.continues(), 5);
}

#[tokio::test]
async fn test_errors_at_threshold_are_not_fatal() {
    let mut script: Vec<_> = (0..10).map(|_| Err(conn_refused())).collect();
    script.push(Ok(recs(2..=2)));
    let source = Arc::new(ScriptedSource::new(Ok(recs(1..=1)), script));

    let (summary, written) = export(source, WriteMode::Accept, options()).await;

    assert_eq!(summary.outcome, ExportOutcome::Completed);
    assert_eq!(summary.errors.total(), 10);
    assert_eq!(written.len(), 2);
}

#[tokio::test]
async fn test_errors_from_both_stages_become_fatal() {
    let script = (0..6).map(|_| Err(conn_refused())).collect();
    let source = Arc::new(ScriptedSource::new(Ok(recs(1..=1)), script).endless());

    let (summary, written) = export(source.clone(), WriteMode::Fail, options()).await;

    assert_eq!(summary.outcome, ExportOutcome::Fatal);
    assert!(summary.errors.fatal);
    assert_eq!(summary.errors.pump_errors, 6);
    assert!(summary.errors.sink_errors >= 5);
    assert!(written.is_empty());
    assert_eq!(source.releases(), 1);
}

#[tokio::test]
async fn test_record_limit() {
    let source = Arc::new(ScriptedSource::new(Ok(recs(1..=2)), Vec::new()).endless());
    let options = PipelineOptions {
        max_records: Some(3),
        ..options()
    };

    let (summary, written) = export(source.clone(), WriteMode::Accept, options).await;

    assert_eq!(summary.outcome, ExportOutcome::LimitReached);
    assert_eq!(written.len(), 3);
    assert_eq!(summary.records_written(), 3);
    assert_eq!(source.releases(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let source = Arc::new(ScriptedSource::new(Ok(recs(1..=2)), Vec::new()).endless());
    let token = CancellationToken::new();
    token.cancel();

    let (writer, records) = RecordingWriter::new(WriteMode::Accept);
    let summary = ExportCoordinator::new(source.clone(), Box::new(writer), options())
        .with_cancellation(token)
        .execute(None)
        .await
        .unwrap();

    assert_eq!(summary.outcome, ExportOutcome::Cancelled);
    assert!(records.lock().unwrap().is_empty());
    assert!(!summary.pump.exhausted);
    assert_eq!(source.continues(), 0);
    assert_eq!(source.releases(), 1);
}

#[tokio::test]
async fn test_open_failure_still_releases() {
    let source = Arc::new(ScriptedSource::new(Err(conn_refused()), Vec::new()));
    let (writer, _) = RecordingWriter::new(WriteMode::Accept);

    let result = ExportCoordinator::new(source.clone(), Box::new(writer), options())
        .execute(None)
        .await;

    assert!(result.is_err());
    assert_eq!(source.continues(), 0);
    assert_eq!(source.releases(), 1);
}

#[tokio::test]
async fn test_stuck_sink_is_aborted_after_drain_window() {
    let source = Arc::new(ScriptedSource::new(Ok(recs(1..=2)), Vec::new()).endless());
    let token = CancellationToken::new();
    let options = PipelineOptions {
        drain_window: Duration::from_millis(50),
        ..options()
    };

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let (writer, _) = RecordingWriter::new(WriteMode::Hang);
    let summary = ExportCoordinator::new(source.clone(), Box::new(writer), options)
        .with_cancellation(token)
        .execute(None)
        .await
        .unwrap();

    assert_eq!(summary.outcome, ExportOutcome::DrainTimeout);
    assert_eq!(summary.records_written(), 0);
    assert_eq!(source.releases(), 1);
}
