//! Search service clients
//!
//! A [`SearchClient`] is the thin transport a cursor session drives. It knows
//! how to start a paged query, continue it with a cursor token, and send an
//! administrative command. It holds no paging state of its own.
//!
//! Two transports ship with the crate:
//! - [`ElasticClient`]: the Elasticsearch scroll API over HTTP
//! - [`MongoClient`]: MongoDB `find` / `getMore` / `killCursors` commands

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ScrollError;
use crate::session::Record;

pub mod elastic;
pub mod mongo;

pub use elastic::ElasticClient;
pub use mongo::MongoClient;

/// Paging arguments attached to every search and continuation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollArgs {
    /// Server-side cursor keep-alive, e.g. "1m"
    pub keepalive: String,
    /// Records requested per page
    pub page_size: u32,
}

/// One page returned by the service
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Records in service order
    pub records: Vec<Record>,
    /// Cursor token to continue from
    pub token: String,
    /// Total number of matching records, when the service reports it
    pub total: Option<u64>,
    /// The service reported that it gave up before finishing the request
    pub timed_out: bool,
}

/// HTTP-style verb of an administrative command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// An administrative request sent through [`SearchClient::command`]
#[derive(Debug, Clone, PartialEq)]
pub struct AdminCommand {
    pub method: CommandMethod,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Value,
}

/// Transport contract consumed by [`crate::session::CursorSession`]
///
/// Implementations issue exactly the request they are asked for. Retrying,
/// token bookkeeping and end-of-data detection belong to the callers.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Start a paged query against `collection`
    ///
    /// # Arguments
    /// * `collection` - Index or collection name
    /// * `kind` - Document sub-type filter (empty for none)
    /// * `args` - Keep-alive and page size
    /// * `body` - Query document
    async fn search(
        &self,
        collection: &str,
        kind: &str,
        args: &ScrollArgs,
        body: &Value,
    ) -> Result<SearchPage, ScrollError>;

    /// Fetch the page following `token`
    async fn continue_scroll(&self, args: &ScrollArgs, token: &str) -> Result<SearchPage, ScrollError>;

    /// Send an administrative command and return the raw response body
    async fn command(&self, command: &AdminCommand) -> Result<Vec<u8>, ScrollError>;

    /// Build the command that releases `tokens` in a single request
    ///
    /// Returns `None` when none of the tokens refers to live server state.
    fn release_command(&self, tokens: &[String]) -> Option<AdminCommand>;

    /// Query used when the caller supplies none
    fn default_query(&self) -> Value;
}
