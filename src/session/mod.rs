//! Cursor sessions
//!
//! A cursor session owns the paging state of one export: the token to
//! continue from and every token the service ever handed out, so all of them
//! can be released when the export ends.
//!
//! The pipeline only sees the narrow [`ScrollSource`] capability, which
//! lets a file replay stand in for a live service.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{ScrollArgs, SearchClient, SearchPage};
use crate::config::SourceConfig;
use crate::error::ScrollError;

pub mod record;
pub mod replay;

pub use record::Record;
pub use replay::ReplaySource;

/// Open / continue / release contract consumed by the pump and the shutdown path
#[async_trait]
pub trait ScrollSource: Send + Sync {
    /// Start the cursor and return the first batch (possibly empty)
    async fn open(&self, query: &Value) -> Result<Vec<Record>, ScrollError>;

    /// Return the next batch; an empty batch means the cursor is exhausted
    async fn continue_scroll(&self) -> Result<Vec<Record>, ScrollError>;

    /// Release every cursor issued so far and return the raw response
    async fn release(&self) -> Result<Vec<u8>, ScrollError>;

    /// Total number of matching records, when known
    fn total_hits(&self) -> Option<u64> {
        None
    }

    /// Query used when the caller supplies none
    fn default_query(&self) -> Value {
        Value::Object(Default::default())
    }
}

/// Immutable paging settings of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollSettings {
    pub collection: String,
    pub kind: String,
    pub args: ScrollArgs,
}

impl ScrollSettings {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            collection: config.collection.clone(),
            kind: config.kind.clone(),
            args: ScrollArgs {
                keepalive: config.scroll_keepalive.clone(),
                page_size: config.page_size,
            },
        }
    }
}

#[derive(Debug, Default)]
struct TokenLedger {
    current: Option<String>,
    issued: BTreeSet<String>,
}

impl TokenLedger {
    /// Remember a token for cleanup without continuing from it
    fn issue(&mut self, token: String) {
        self.issued.insert(token);
    }

    fn record(&mut self, token: String) {
        self.issue(token.clone());
        self.current = Some(token);
    }
}

/// Cursor session over a [`SearchClient`]
///
/// `open` and every successful `continue_scroll` record the returned token.
/// The token ledger is only reachable through these operations.
pub struct CursorSession<C> {
    settings: ScrollSettings,
    client: C,
    tokens: Mutex<TokenLedger>,
    total_hits: OnceLock<u64>,
}

impl<C: SearchClient> CursorSession<C> {
    pub fn new(settings: ScrollSettings, client: C) -> Self {
        Self {
            settings,
            client,
            tokens: Mutex::new(TokenLedger::default()),
            total_hits: OnceLock::new(),
        }
    }

    pub fn settings(&self) -> &ScrollSettings {
        &self.settings
    }

    /// Token the next continuation will use
    pub async fn current_token(&self) -> Option<String> {
        self.tokens.lock().await.current.clone()
    }

    /// Every token issued so far
    pub async fn issued_tokens(&self) -> Vec<String> {
        self.tokens.lock().await.issued.iter().cloned().collect()
    }

    async fn accept(&self, page: SearchPage) -> Result<Vec<Record>, ScrollError> {
        let mut tokens = self.tokens.lock().await;
        if page.timed_out {
            // Still released at cleanup, but the next continuation reuses the old token.
            tokens.issue(page.token);
            return Err(ScrollError::TimedOut);
        }
        tokens.record(page.token);
        Ok(page.records)
    }
}

#[async_trait]
impl<C: SearchClient> ScrollSource for CursorSession<C> {
    async fn open(&self, query: &Value) -> Result<Vec<Record>, ScrollError> {
        let page = self
            .client
            .search(
                &self.settings.collection,
                &self.settings.kind,
                &self.settings.args,
                query,
            )
            .await?;

        if let Some(total) = page.total {
            let _ = self.total_hits.set(total);
        }
        info!(
            "Opened cursor on '{}': {} records in first batch, {} total",
            self.settings.collection,
            page.records.len(),
            page.total.map_or_else(|| "unknown".to_string(), |t| t.to_string())
        );

        self.accept(page).await
    }

    async fn continue_scroll(&self) -> Result<Vec<Record>, ScrollError> {
        let token = self
            .tokens
            .lock()
            .await
            .current
            .clone()
            .ok_or(ScrollError::NotOpened)?;

        let page = self.client.continue_scroll(&self.settings.args, &token).await?;
        debug!("Continued cursor: {} records", page.records.len());
        self.accept(page).await
    }

    async fn release(&self) -> Result<Vec<u8>, ScrollError> {
        let tokens = self.issued_tokens().await;
        if tokens.is_empty() {
            debug!("No cursors issued, nothing to release");
            return Ok(Vec::new());
        }

        let Some(command) = self.client.release_command(&tokens) else {
            debug!("No live cursors among {} issued tokens", tokens.len());
            return Ok(Vec::new());
        };

        info!("Releasing {} cursors", tokens.len());
        self.client.command(&command).await
    }

    fn total_hits(&self) -> Option<u64> {
        self.total_hits.get().copied()
    }

    fn default_query(&self) -> Value {
        self.client.default_query()
    }
}
