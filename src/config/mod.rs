//! Configuration management for scrollpump
//!
//! Configuration is loaded from a TOML file and then overridden by
//! command-line arguments.
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where records are read from
    #[serde(default)]
    pub source: SourceConfig,

    /// Pump/sink pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Where records are written to
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend serving the scroll cursor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Elasticsearch scroll API over HTTP
    Elasticsearch,

    /// MongoDB find/getMore cursor
    Mongodb,

    /// JSON-lines file replayed page by page
    Replay,
}

/// Source (cursor session) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,

    /// Hosts to connect to; requests are spread round-robin
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Port shared by every host (backend default when unset)
    #[serde(default)]
    pub port: Option<u16>,

    /// Index or collection to export
    #[serde(default)]
    pub collection: String,

    /// Document type filter (Elasticsearch < 7 only; empty for none)
    #[serde(default)]
    pub kind: String,

    /// Database holding the collection (MongoDB only)
    #[serde(default = "default_database")]
    pub database: String,

    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Server-side cursor keep-alive, e.g. "1m"
    #[serde(default = "default_scroll_keepalive")]
    pub scroll_keepalive: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Use https when talking to the hosts
    #[serde(default)]
    pub tls: bool,

    /// File read by the replay backend
    #[serde(default)]
    pub replay_file: Option<PathBuf>,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Errors tolerated before the export is aborted
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,

    /// Seconds allowed for in-flight records to drain once shutdown starts
    #[serde(default = "default_drain_window")]
    pub drain_window: u64,

    /// Stop after this many records have been written (None for all)
    #[serde(default)]
    pub max_records: Option<u64>,

    /// Delay policy between failed continuation attempts
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Exponential backoff applied by the pump after a failed continuation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output file (None for stdout)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Terminate each payload with a newline
    #[serde(default = "default_newline")]
    pub newline: bool,

    /// Write buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Draw a progress bar on stderr
    #[serde(default)]
    pub progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_backend() -> Backend {
    Backend::Elasticsearch
}

fn default_hosts() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_database() -> String {
    "test".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_scroll_keepalive() -> String {
    "1m".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_errors() -> u32 {
    10
}

fn default_drain_window() -> u64 {
    90
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_newline() -> bool {
    true
}

fn default_buffer_size() -> usize {
    8 * 1024 * 1024
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            hosts: default_hosts(),
            port: None,
            collection: String::new(),
            kind: String::new(),
            database: default_database(),
            page_size: default_page_size(),
            scroll_keepalive: default_scroll_keepalive(),
            request_timeout: default_request_timeout(),
            tls: false,
            replay_file: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
            drain_window: default_drain_window(),
            max_records: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            newline: default_newline(),
            buffer_size: default_buffer_size(),
            progress: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// An explicitly given path must exist. When no path is given the default
    /// location is tried and defaults are used if nothing is there.
    ///
    /// # Arguments
    /// * `path` - Optional path to the configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Serialize the effective configuration back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scrollpump")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        let source = &self.source;

        if source.page_size == 0 {
            return Err(invalid("source.page_size", "0"));
        }

        match source.backend {
            Backend::Replay => {
                if source.replay_file.is_none() {
                    return Err(ConfigError::MissingField("source.replay_file".into()).into());
                }
            }
            Backend::Elasticsearch | Backend::Mongodb => {
                if source.hosts.iter().all(|h| h.trim().is_empty()) {
                    return Err(ConfigError::MissingField("source.hosts".into()).into());
                }
                if source.collection.trim().is_empty() {
                    return Err(ConfigError::MissingField("source.collection".into()).into());
                }
            }
        }

        if source.scroll_keepalive.trim().is_empty() {
            return Err(ConfigError::MissingField("source.scroll_keepalive".into()).into());
        }

        let retry = &self.pipeline.retry;
        if !(retry.multiplier >= 1.0) {
            return Err(invalid("pipeline.retry.multiplier", &retry.multiplier.to_string()));
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(invalid("pipeline.retry.max_delay_ms", &retry.max_delay_ms.to_string()));
        }

        Ok(())
    }

    /// Get the per-request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.source.request_timeout)
    }

    /// Get the drain window as Duration
    pub fn drain_window(&self) -> Duration {
        Duration::from_secs(self.pipeline.drain_window)
    }
}

impl SourceConfig {
    /// Port to use, falling back to the backend's well-known port
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.backend {
            Backend::Elasticsearch | Backend::Replay => 9200,
            Backend::Mongodb => 27017,
        })
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn invalid(field: &str, value: &str) -> crate::error::ScrollpumpError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.source.collection = "shakespeare".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.backend, Backend::Elasticsearch);
        assert_eq!(config.source.hosts, vec!["127.0.0.1".to_string()]);
        assert_eq!(config.source.effective_port(), 9200);
        assert_eq!(config.pipeline.max_errors, 10);
        assert_eq!(config.drain_window(), Duration::from_secs(90));
        assert!(config.output.newline);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [source]
            backend = "mongodb"
            hosts = ["db1", "db2"]
            collection = "events"
            page_size = 250

            [pipeline]
            max_records = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.source.backend, Backend::Mongodb);
        assert_eq!(config.source.effective_port(), 27017);
        assert_eq!(config.source.page_size, 250);
        assert_eq!(config.pipeline.max_records, Some(1000));
        assert_eq!(config.pipeline.max_errors, 10);
        assert_eq!(config.source.scroll_keepalive, "1m");
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[source\npage_size = ").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error: Invalid config format"));
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = Config::load_from_file(Some(Path::new("/nonexistent/scrollpump.toml"))).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ScrollpumpError::Config(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(valid_config().validate().is_ok());

        let missing_collection = Config::default();
        assert!(missing_collection.validate().is_err());

        let mut zero_page = valid_config();
        zero_page.source.page_size = 0;
        assert!(zero_page.validate().is_err());

        let mut replay = Config::default();
        replay.source.backend = Backend::Replay;
        assert!(replay.validate().is_err());
        replay.source.replay_file = Some(PathBuf::from("dump.jsonl"));
        assert!(replay.validate().is_ok());

        let mut shrinking = valid_config();
        shrinking.pipeline.retry.multiplier = 0.5;
        assert!(shrinking.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_keeps_overrides() {
        let mut config = valid_config();
        config.output.newline = false;
        let text = config.to_toml_string().unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert!(!back.output.newline);
        assert_eq!(back.source.collection, "shakespeare");
    }
}
