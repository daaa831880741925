//! scrollpump
//!
//! Streams every record behind an Elasticsearch scroll or a MongoDB cursor to
//! a file or stdout, then releases the cursor.
//!
//! # Usage
//!
//! ```bash
//! # Whole index to a file
//! scrollpump --host es1,es2 -i logs-2024 -o logs.jsonl
//!
//! # First 1000 matching records to stdout
//! scrollpump -i logs-2024 --docs 1000 --query '{"query":{"term":{"level":"error"}}}'
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use scrollpump::cli::CliInterface;
use scrollpump::client::{ElasticClient, MongoClient};
use scrollpump::config::{Backend, Config};
use scrollpump::error::{ConfigError, Result};
use scrollpump::pipeline::{ExportCoordinator, ExportOutcome, PipelineOptions, open_output};
use scrollpump::session::{CursorSession, ReplaySource, ScrollSettings, ScrollSource};

/// Application entry point
#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands, or run one export
///
/// # Returns
/// * `Result<bool>` - Whether the process should exit successfully
async fn run() -> Result<bool> {
    let cli = CliInterface::new()?;

    initialize_logging(cli.config());

    if cli.handle_subcommand()? {
        return Ok(true);
    }

    let config = cli.config();
    config.validate()?;
    let query = cli.query()?;

    let source = build_source(config).await?;
    let writer = open_output(&config.output).await?;

    let cancel = CancellationToken::new();
    let ctrl_c_handle = spawn_interrupt_handler(cancel.clone());

    let summary = ExportCoordinator::new(source, writer, PipelineOptions::from_config(config))
        .with_cancellation(cancel)
        .execute(query)
        .await;

    ctrl_c_handle.abort();
    let summary = summary?;

    Ok(!matches!(
        summary.outcome,
        ExportOutcome::Fatal | ExportOutcome::DrainTimeout
    ))
}

/// Build the cursor session for the configured backend
async fn build_source(config: &Config) -> Result<Arc<dyn ScrollSource>> {
    let source_config = &config.source;
    let settings = ScrollSettings::from_config(source_config);
    let port = source_config.effective_port();

    let source: Arc<dyn ScrollSource> = match source_config.backend {
        Backend::Elasticsearch => {
            let client = ElasticClient::new(
                &source_config.hosts,
                port,
                source_config.tls,
                config.request_timeout(),
            )?;
            Arc::new(CursorSession::new(settings, client))
        }
        Backend::Mongodb => {
            let client = MongoClient::connect(
                &source_config.hosts,
                port,
                &source_config.database,
                &source_config.collection,
                config.request_timeout(),
            )
            .await?;
            Arc::new(CursorSession::new(settings, client))
        }
        Backend::Replay => {
            let path = source_config
                .replay_file
                .clone()
                .ok_or_else(|| ConfigError::MissingField("source.replay_file".to_string()))?;
            Arc::new(ReplaySource::new(
                path,
                source_config.collection.clone(),
                source_config.page_size,
            ))
        }
    };

    Ok(source)
}

/// Cancel the export on Ctrl+C
fn spawn_interrupt_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, draining in-flight records");
                cancel.cancel();
            }
            Err(err) => error!("Failed to listen for Ctrl+C: {}", err),
        }
    })
}

/// Initialize logging on stderr
///
/// `RUST_LOG` takes precedence over the configured level. stdout is left
/// for records.
fn initialize_logging(config: &Config) {
    let level = LevelFilter::from_level(config.logging.level.to_tracing_level());
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
