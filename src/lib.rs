//! scrollpump library
//!
//! Pages through a server-side cursor (an Elasticsearch scroll or a MongoDB
//! `find` cursor) and streams every record to an output with bounded memory.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `client`: Wire clients for the cursor backends
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `pipeline`: Pump, sink, error aggregation and shutdown coordination
//! - `session`: Cursor sessions and the token ledger
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use scrollpump::client::ElasticClient;
//! use scrollpump::config::Config;
//! use scrollpump::pipeline::{ExportCoordinator, PipelineOptions, open_output};
//! use scrollpump::session::{CursorSession, ScrollSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.source.collection = "logs-2024".to_string();
//!
//!     let client = ElasticClient::new(&config.source.hosts, 9200, false, Duration::from_secs(60))?;
//!     let session = Arc::new(CursorSession::new(ScrollSettings::from_config(&config.source), client));
//!     let writer = open_output(&config.output).await?;
//!
//!     let summary = ExportCoordinator::new(session, writer, PipelineOptions::from_config(&config))
//!         .execute(None)
//!         .await?;
//!     eprintln!("{} records exported", summary.records_written());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, ScrollError, ScrollpumpError};
pub use pipeline::{ExportCoordinator, ExportOutcome, ExportSummary};
pub use session::{CursorSession, Record, ScrollSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
