//! Command-line interface for scrollpump
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and argument overrides
//! - Query parsing (inline JSON or `@file`)
//! - Subcommands (shell completion, configuration)

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::{Backend, Config, LogLevel};
use crate::error::{ConfigError, Result};

pub mod completion;

/// Stream every record behind a scroll cursor to a file or stdout
#[derive(Parser, Debug)]
#[command(
    name = "scrollpump",
    version,
    about = "Export every record behind a scroll cursor",
    long_about = "Opens a scroll cursor on Elasticsearch or MongoDB (or replays a JSON-lines dump),
streams every record to a file or stdout one at a time, and releases the cursor when done."
)]
pub struct CliArgs {
    /// Backend serving the cursor
    #[arg(long, value_enum, value_name = "BACKEND")]
    pub backend: Option<Backend>,

    /// Server to connect to (repeat or comma-separate for several)
    #[arg(long = "host", value_name = "HOST", value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Port to connect to
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Index or collection to export
    #[arg(short = 'i', long, value_name = "NAME")]
    pub index: Option<String>,

    /// Document type (pre-7 Elasticsearch only)
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: Option<String>,

    /// Database holding the collection (MongoDB)
    #[arg(long, value_name = "NAME")]
    pub database: Option<String>,

    /// Query document, inline JSON or @path to a file
    #[arg(long, value_name = "JSON")]
    pub query: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Stop after this many records
    #[arg(long, value_name = "COUNT")]
    pub docs: Option<u64>,

    /// Records per page
    #[arg(long, value_name = "SIZE")]
    pub page_size: Option<u32>,

    /// Scroll keepalive (e.g. 1m, 30s)
    #[arg(long = "scroll", value_name = "DURATION")]
    pub scroll_keepalive: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Errors tolerated before aborting
    #[arg(long, value_name = "COUNT")]
    pub max_errors: Option<u32>,

    /// Seconds allowed for in-flight records to drain on shutdown
    #[arg(long, value_name = "SECONDS")]
    pub drain_window: Option<u64>,

    /// JSON-lines file for the replay backend
    #[arg(long, value_name = "FILE")]
    pub replay_file: Option<PathBuf>,

    /// Use HTTPS
    #[arg(long)]
    pub tls: bool,

    /// Write payloads back to back without a newline after each
    #[arg(long = "no-newline")]
    pub no_newline: bool,

    /// Show a progress bar on stderr
    #[arg(long)]
    pub progress: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for scrollpump
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Configuration with argument overrides applied
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Query given on the command line, if any
    ///
    /// # Returns
    /// * `Result<Option<Value>>` - Parsed query document or error
    pub fn query(&self) -> Result<Option<Value>> {
        self.args.query.as_deref().map(parse_query).transpose()
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_source_args(config, args);
        Self::apply_pipeline_args(config, args);
        Self::apply_output_args(config, args);
        Self::apply_logging_args(config, args);
    }

    fn apply_source_args(config: &mut Config, args: &CliArgs) {
        let source = &mut config.source;

        if let Some(backend) = args.backend {
            source.backend = backend;
        }
        if !args.hosts.is_empty() {
            source.hosts = args.hosts.clone();
        }
        if args.port.is_some() {
            source.port = args.port;
        }
        if let Some(ref index) = args.index {
            source.collection = index.clone();
        }
        if let Some(ref kind) = args.kind {
            source.kind = kind.clone();
        }
        if let Some(ref database) = args.database {
            source.database = database.clone();
        }
        if let Some(size) = args.page_size {
            source.page_size = size;
        }
        if let Some(ref keepalive) = args.scroll_keepalive {
            source.scroll_keepalive = keepalive.clone();
        }
        if let Some(timeout) = args.timeout {
            source.request_timeout = timeout;
        }
        if args.tls {
            source.tls = true;
        }
        if let Some(ref file) = args.replay_file {
            source.replay_file = Some(file.clone());
            // A replay file only makes sense with the replay backend.
            if args.backend.is_none() {
                source.backend = Backend::Replay;
            }
        }
    }

    fn apply_pipeline_args(config: &mut Config, args: &CliArgs) {
        if let Some(max) = args.max_errors {
            config.pipeline.max_errors = max;
        }
        if let Some(secs) = args.drain_window {
            config.pipeline.drain_window = secs;
        }
        if args.docs.is_some() {
            config.pipeline.max_records = args.docs;
        }
    }

    fn apply_output_args(config: &mut Config, args: &CliArgs) {
        if let Some(ref path) = args.output {
            config.output.path = Some(path.clone());
        }
        if args.no_newline {
            config.output.newline = false;
        }
        if args.progress {
            config.output.progress = true;
        }
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Completion { shell }) => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handle config subcommand
    ///
    /// # Arguments
    /// * `show` - Whether to show configuration
    /// * `validate` - Whether to validate configuration
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config()?;
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate the effective configuration
    fn validate_config(&self) -> Result<()> {
        let path = self.config_path();
        println!("Validating configuration: {}", path.display());

        self.config.validate()?;
        println!("Configuration is valid");
        Ok(())
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        let path = self.config_path();
        println!("# Configuration file: {}", path.display());
        println!();
        print!("{}", self.config.to_toml_string()?);
        Ok(())
    }

    /// Config file in use: the explicit one or the default location
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

/// Parse a query argument
///
/// `@path` reads the query from a file, anything else is parsed as inline JSON.
/// The result must be a JSON object.
pub fn parse_query(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => read_query_file(Path::new(path))?,
        None => raw.to_string(),
    };

    let value: Value = serde_json::from_str(&text).map_err(|e| ConfigError::InvalidValue {
        field: "query".to_string(),
        value: e.to_string(),
    })?;

    if !value.is_object() {
        return Err(ConfigError::InvalidValue {
            field: "query".to_string(),
            value: "query must be a JSON object".to_string(),
        }
        .into());
    }

    Ok(value)
}

fn read_query_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()).into());
    }
    Ok(std::fs::read_to_string(path)?)
}
