//! Record writers used by the sink
//!
//! A writer persists one record per call. Payload bytes are written verbatim,
//! optionally followed by a newline.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::OutputConfig;
use crate::error::{ConfigError, Result, ScrollError};
use crate::session::Record;

/// Trait for persisting records
#[async_trait]
pub trait RecordWriter: Send {
    /// Write one record
    ///
    /// # Returns
    /// * `Result<usize, ScrollError>` - Number of bytes written
    async fn write_record(&mut self, record: &Record) -> std::result::Result<usize, ScrollError>;

    /// Flush buffered output
    async fn finalize(&mut self) -> std::result::Result<(), ScrollError>;
}

/// Writer over any async byte stream (stdout, a file, a socket)
pub struct StreamWriter<W> {
    inner: BufWriter<W>,
    newline: bool,
    written: u64,
}

impl<W: AsyncWrite + Unpin + Send> StreamWriter<W> {
    pub fn new(inner: W, newline: bool, buffer_size: usize) -> Self {
        Self {
            inner: BufWriter::with_capacity(buffer_size.max(1), inner),
            newline,
            written: 0,
        }
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RecordWriter for StreamWriter<W> {
    async fn write_record(&mut self, record: &Record) -> std::result::Result<usize, ScrollError> {
        self.inner
            .write_all(&record.payload)
            .await
            .map_err(|e| ScrollError::Write(format!("record {}: {e}", record.id)))?;

        let mut len = record.payload.len();
        if self.newline {
            self.inner
                .write_all(b"\n")
                .await
                .map_err(|e| ScrollError::Write(format!("record {}: {e}", record.id)))?;
            len += 1;
        }

        self.written += 1;
        Ok(len)
    }

    async fn finalize(&mut self) -> std::result::Result<(), ScrollError> {
        self.inner
            .flush()
            .await
            .map_err(|e| ScrollError::Write(format!("flush: {e}")))?;
        debug!("Flushed output after {} records", self.written);
        Ok(())
    }
}

/// Open the configured output destination
///
/// # Arguments
/// * `config` - Output configuration; no path means stdout
///
/// # Returns
/// * `Result<Box<dyn RecordWriter>>` - Writer or error
pub async fn open_output(config: &OutputConfig) -> Result<Box<dyn RecordWriter>> {
    match config.path {
        Some(ref path) => {
            validate_path(path)?;
            let file = File::create(path).await?;
            debug!("Writing records to {}", path.display());
            Ok(Box::new(StreamWriter::new(file, config.newline, config.buffer_size)))
        }
        None => Ok(Box::new(StreamWriter::new(
            tokio::io::stdout(),
            config.newline,
            config.buffer_size,
        ))),
    }
}

/// Check that the parent directory of an output file exists
fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ConfigError::InvalidValue {
                field: "output.path".to_string(),
                value: path.display().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_newline_delimited() {
        let mut writer = StreamWriter::new(Vec::new(), true, 64);

        writer.write_record(&Record::new("1", "idx", "", b"{\"a\":1}".to_vec())).await.unwrap();
        writer.write_record(&Record::new("2", "idx", "", b"{\"a\":2}".to_vec())).await.unwrap();
        writer.finalize().await.unwrap();

        assert_eq!(writer.into_inner(), b"{\"a\":1}\n{\"a\":2}\n".to_vec());
    }

    #[tokio::test]
    async fn test_verbatim_without_delimiter() {
        let mut writer = StreamWriter::new(Vec::new(), false, 64);

        let n = writer.write_record(&Record::new("1", "idx", "", b"abc".to_vec())).await.unwrap();
        writer.write_record(&Record::new("2", "idx", "", Vec::new())).await.unwrap();
        writer.finalize().await.unwrap();

        assert_eq!(n, 3);
        assert_eq!(writer.into_inner(), b"abc".to_vec());
    }

    #[tokio::test]
    async fn test_open_output_file() {
        let path = std::env::temp_dir().join(format!("scrollpump_{}_out.jsonl", std::process::id()));
        let config = OutputConfig {
            path: Some(path.clone()),
            ..Default::default()
        };

        let mut writer = open_output(&config).await.unwrap();
        writer.write_record(&Record::new("1", "idx", "", b"{}".to_vec())).await.unwrap();
        writer.finalize().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "{}\n");

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_open_output_invalid_directory() {
        let config = OutputConfig {
            path: Some(PathBuf::from("/nonexistent/directory/out.jsonl")),
            ..Default::default()
        };
        assert!(open_output(&config).await.is_err());
    }
}
