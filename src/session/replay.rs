//! File replay source
//!
//! Replays a JSON-lines file through the pipeline, one page of lines per
//! continuation. Lines shaped like search hits (`_id`, `_index`, `_type`,
//! `_source`) are unwrapped to their source document. Any other line is
//! passed through verbatim.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ScrollError;

use super::{Record, ScrollSource};

pub struct ReplaySource {
    path: PathBuf,
    collection: String,
    page_size: usize,
    state: Mutex<ReplayState>,
}

#[derive(Default)]
struct ReplayState {
    lines: Option<Lines<BufReader<File>>>,
    line_no: u64,
    /// Read error held back so the records before it are delivered first
    pending: Option<ScrollError>,
}

impl ReplaySource {
    /// # Arguments
    /// * `path` - JSON-lines file to replay
    /// * `collection` - Collection name given to records that carry none
    /// * `page_size` - Lines per page
    pub fn new(path: impl AsRef<Path>, collection: impl Into<String>, page_size: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            collection: collection.into(),
            page_size: page_size.max(1) as usize,
            state: Mutex::new(ReplayState::default()),
        }
    }

    async fn read_page(&self, state: &mut ReplayState) -> Result<Vec<Record>, ScrollError> {
        let Some(lines) = state.lines.as_mut() else {
            return Err(ScrollError::NotOpened);
        };
        if let Some(err) = state.pending.take() {
            return Err(err);
        }

        let mut batch = Vec::with_capacity(self.page_size);
        while batch.len() < self.page_size {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    state.line_no += 1;
                    let err = ScrollError::Connection(format!(
                        "{} line {}: {e}",
                        self.path.display(),
                        state.line_no
                    ));
                    if batch.is_empty() {
                        return Err(err);
                    }
                    state.pending = Some(err);
                    break;
                }
            };
            state.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }
            batch.push(self.line_to_record(state.line_no, line));
        }

        Ok(batch)
    }

    fn line_to_record(&self, line_no: u64, line: String) -> Record {
        if let Ok(Value::Object(mut hit)) = serde_json::from_str::<Value>(&line) {
            if let Some(source) = hit.remove("_source") {
                let id = match hit.remove("_id") {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => line_no.to_string(),
                };
                let field = |v: Option<Value>| v.and_then(|v| v.as_str().map(str::to_owned));
                return Record {
                    id,
                    collection: field(hit.remove("_index")).unwrap_or_else(|| self.collection.clone()),
                    kind: field(hit.remove("_type")).unwrap_or_default(),
                    payload: source.to_string().into_bytes(),
                };
            }
        }

        Record::new(line_no.to_string(), self.collection.clone(), "", line.into_bytes())
    }
}

#[async_trait]
impl ScrollSource for ReplaySource {
    async fn open(&self, query: &Value) -> Result<Vec<Record>, ScrollError> {
        if !query.as_object().is_some_and(|q| q.is_empty()) {
            debug!("Replay source ignores queries");
        }

        let file = File::open(&self.path)
            .await
            .map_err(|e| ScrollError::Connection(format!("{}: {e}", self.path.display())))?;
        info!("Replaying {}", self.path.display());

        let mut state = self.state.lock().await;
        *state = ReplayState {
            lines: Some(BufReader::new(file).lines()),
            ..Default::default()
        };
        self.read_page(&mut state).await
    }

    async fn continue_scroll(&self) -> Result<Vec<Record>, ScrollError> {
        let mut state = self.state.lock().await;
        self.read_page(&mut state).await
    }

    async fn release(&self) -> Result<Vec<u8>, ScrollError> {
        self.state.lock().await.lines = None;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn write_fixture(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("scrollpump_{}_{name}", std::process::id()));
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_replay_pages_until_empty() {
        let path = write_fixture(
            "pages.jsonl",
            "{\"a\":1}\n{\"a\":2}\n\n{\"a\":3}\n{\"a\":4}\n{\"a\":5}\n",
        )
        .await;
        let source = ReplaySource::new(&path, "dump", 2);

        let mut sizes = vec![source.open(&json!({})).await.unwrap().len()];
        loop {
            let batch = source.continue_scroll().await.unwrap();
            sizes.push(batch.len());
            if batch.is_empty() {
                break;
            }
        }
        assert_eq!(sizes, vec![2, 2, 1, 0]);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_replay_unwraps_hits() {
        let path = write_fixture(
            "hits.jsonl",
            "{\"_index\":\"shakespeare\",\"_type\":\"line\",\"_id\":\"7\",\"_source\":{\"speaker\":\"HAMLET\"}}\nplain text\n",
        )
        .await;
        let source = ReplaySource::new(&path, "dump", 10);

        let batch = source.open(&json!({})).await.unwrap();
        assert_eq!(batch[0].id, "7");
        assert_eq!(batch[0].collection, "shakespeare");
        assert_eq!(batch[0].kind, "line");
        assert_eq!(batch[0].payload, br#"{"speaker":"HAMLET"}"#.to_vec());

        assert_eq!(batch[1].id, "2");
        assert_eq!(batch[1].collection, "dump");
        assert_eq!(batch[1].payload, b"plain text".to_vec());

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_replay_bad_line_keeps_earlier_records() {
        let path = std::env::temp_dir().join(format!("scrollpump_{}_bad_utf8.jsonl", std::process::id()));
        let mut content = b"{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n".to_vec();
        content.extend_from_slice(&[0xFF, 0xFE, b'\n']);
        content.extend_from_slice(b"{\"a\":4}\n");
        tokio::fs::write(&path, content).await.unwrap();
        let source = ReplaySource::new(&path, "dump", 2);

        let mut delivered = source.open(&json!({})).await.unwrap();
        let mut errors = 0;
        loop {
            match source.continue_scroll().await {
                Ok(batch) if batch.is_empty() => break,
                Ok(batch) => delivered.extend(batch),
                Err(e) => {
                    assert_eq!(e.kind(), "connection");
                    errors += 1;
                }
            }
        }

        let payloads: Vec<&[u8]> = delivered.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(
            payloads,
            [
                &b"{\"a\":1}"[..],
                &b"{\"a\":2}"[..],
                &b"{\"a\":3}"[..],
                &b"{\"a\":4}"[..],
            ]
        );
        assert_eq!(errors, 1);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let source = ReplaySource::new("/nonexistent/dump.jsonl", "dump", 10);
        assert!(matches!(
            source.open(&json!({})).await,
            Err(ScrollError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_continue_before_open() {
        let source = ReplaySource::new("/nonexistent/dump.jsonl", "dump", 10);
        assert_eq!(source.continue_scroll().await, Err(ScrollError::NotOpened));
        assert!(source.release().await.unwrap().is_empty());
    }
}
