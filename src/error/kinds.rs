use std::{fmt, io};

use crate::error::remote::ErrorInfo;

/// Crate-wide `Result` type using [`ScrollpumpError`] as the error.
pub type Result<T> = std::result::Result<T, ScrollpumpError>;

/// Top-level error type for scrollpump.
///
/// Wraps the more specific error kinds so `main` has a single type to report.
#[derive(Debug)]
pub enum ScrollpumpError {
    /// Failure talking to the search service or writing a record.
    Scroll(ScrollError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors outside the record sink (opening output files, reading queries).
    Io(io::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Failure kinds observed while paging a cursor or persisting records.
///
/// None of these is fatal on its own. The pump and the sink report them and
/// keep looping; only the error aggregator escalates, and only by count.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollError {
    /// Transport failure reaching the service.
    Connection(String),

    /// The service answered with a non-success status.
    Protocol(ErrorInfo),

    /// The response body could not be decoded.
    Decode(String),

    /// The service reported that its own operation timed out.
    TimedOut,

    /// The sink failed to persist a record.
    Write(String),

    /// Continue was called before a successful Open.
    NotOpened,
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl ScrollError {
    /// Short stable name of the error kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrollError::Connection(_) => "connection",
            ScrollError::Protocol(_) => "protocol",
            ScrollError::Decode(_) => "decode",
            ScrollError::TimedOut => "timed_out",
            ScrollError::Write(_) => "write",
            ScrollError::NotOpened => "not_opened",
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ScrollpumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollpumpError::Scroll(e) => write!(f, "{e}"),
            ScrollpumpError::Config(e) => write!(f, "Configuration error: {e}"),
            ScrollpumpError::Io(e) => write!(f, "I/O error: {e}"),
            ScrollpumpError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ScrollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollError::Connection(msg) => write!(f, "Connection error: {msg}"),
            ScrollError::Protocol(info) => write!(f, "Protocol error: {info}"),
            ScrollError::Decode(msg) => write!(f, "Decode error: {msg}"),
            ScrollError::TimedOut => write!(f, "Scroll timed out on the server"),
            ScrollError::Write(msg) => write!(f, "Write error: {msg}"),
            ScrollError::NotOpened => write!(f, "Cursor session has not been opened"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ScrollpumpError {}
impl std::error::Error for ScrollError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ScrollpumpError ========================= */

impl From<io::Error> for ScrollpumpError {
    fn from(err: io::Error) -> Self {
        ScrollpumpError::Io(err)
    }
}

impl From<ScrollError> for ScrollpumpError {
    fn from(err: ScrollError) -> Self {
        ScrollpumpError::Scroll(err)
    }
}

impl From<ConfigError> for ScrollpumpError {
    fn from(err: ConfigError) -> Self {
        ScrollpumpError::Config(err)
    }
}

impl From<String> for ScrollpumpError {
    fn from(msg: String) -> Self {
        ScrollpumpError::Generic(msg)
    }
}

impl From<&str> for ScrollpumpError {
    fn from(msg: &str) -> Self {
        ScrollpumpError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(ScrollError::Connection("refused".into()).kind(), "connection");
        assert_eq!(ScrollError::TimedOut.kind(), "timed_out");
        assert_eq!(ScrollError::Write("broken pipe".into()).kind(), "write");
    }

    #[test]
    fn test_display_wraps_scroll_error_verbatim() {
        let err: ScrollpumpError = ScrollError::Decode("missing hits".into()).into();
        assert_eq!(err.to_string(), "Decode error: missing hits");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "source.page_size".into(),
            value: "0".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value '0' for field 'source.page_size'"
        );
    }
}
