use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScrollError;

/// Structured error information extracted from a remote service failure.
///
/// Serializable so it can be attached to structured logs as a single field.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ErrorInfo {
    /// Extract error info from an HTTP error response.
    ///
    /// Elasticsearch answers with either `{"error": {"type", "reason"}, "status"}`
    /// or, on old versions, `{"error": "message", "status"}`. Anything else is
    /// kept as a raw (truncated) reason.
    pub fn from_http_body(status: u16, body: &[u8]) -> Self {
        let mut info = ErrorInfo {
            status: Some(status),
            ..Default::default()
        };

        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => match map.get("error") {
                Some(Value::Object(err)) => {
                    info.error_type = err.get("type").and_then(Value::as_str).map(str::to_owned);
                    info.reason = err.get("reason").and_then(Value::as_str).map(str::to_owned);
                }
                Some(Value::String(msg)) => info.reason = Some(msg.clone()),
                _ => info.reason = raw_reason(body),
            },
            _ => info.reason = raw_reason(body),
        }

        info
    }

    /// Extract error info from a MongoDB driver error using the typed error kinds.
    pub fn from_mongodb_error(error: &mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let mut info = ErrorInfo::default();
        match error.kind.as_ref() {
            ErrorKind::Command(command_error) => {
                info.error_type = Some(command_error.code_name.clone());
                info.code = Some(command_error.code);
                info.reason = Some(command_error.message.clone());
            }
            ErrorKind::Authentication { message, .. } => {
                info.error_type = Some("authentication_error".to_string());
                info.reason = Some(message.clone());
            }
            ErrorKind::InvalidArgument { message, .. } => {
                info.error_type = Some("invalid_argument".to_string());
                info.reason = Some(message.clone());
            }
            _ => info.reason = Some(error.to_string()),
        }
        info
    }

    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "[{status}] ")?;
        }
        if let Some(code) = self.code {
            write!(f, "code {code} ")?;
        }
        match (&self.error_type, &self.reason) {
            (Some(t), Some(r)) => write!(f, "{t}: {r}"),
            (Some(t), None) => write!(f, "{t}"),
            (None, Some(r)) => write!(f, "{r}"),
            (None, None) => write!(f, "no details"),
        }
    }
}

/// Classify a MongoDB driver error into a scroll error kind.
impl From<mongodb::error::Error> for ScrollError {
    fn from(error: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match error.kind.as_ref() {
            // MaxTimeMSExpired
            ErrorKind::Command(command_error) if command_error.code == 50 => ScrollError::TimedOut,
            ErrorKind::Command(_) | ErrorKind::Authentication { .. } | ErrorKind::InvalidArgument { .. } => {
                ScrollError::Protocol(ErrorInfo::from_mongodb_error(&error))
            }
            ErrorKind::BsonDeserialization(e) => ScrollError::Decode(e.to_string()),
            ErrorKind::InvalidResponse { message, .. } => ScrollError::Decode(message.clone()),
            _ => ScrollError::Connection(error.to_string()),
        }
    }
}

fn raw_reason(body: &[u8]) -> Option<String> {
    const MAX_REASON: usize = 512;

    if body.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.len() <= MAX_REASON {
        return Some(trimmed.to_string());
    }
    let mut end = MAX_REASON;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    Some(format!("{}...", &trimmed[..end]))
}
