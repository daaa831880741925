//! Error handling for scroll exports.
//!
//! This module provides:
//! - [`ScrollError`]: the recoverable failure kinds reported by the cursor
//!   session, the pump and the sink
//! - Structured [`ErrorInfo`] extraction from remote error bodies
//! - The crate-wide [`ScrollpumpError`] and [`Result`] alias
//!
//! # Example
//!
//! ```rust
//! use scrollpump::error::{ErrorInfo, ScrollError};
//!
//! let body = br#"{"error":{"type":"index_not_found_exception","reason":"no such index"},"status":404}"#;
//! let err = ScrollError::Protocol(ErrorInfo::from_http_body(404, body));
//! assert_eq!(err.kind(), "protocol");
//! ```

pub mod kinds;
pub mod remote;

// Re-export commonly used types
pub use kinds::{ConfigError, Result, ScrollError, ScrollpumpError};
pub use remote::ErrorInfo;
