//! Elasticsearch scroll transport
//!
//! Works against 2.x through 8.x: the scroll endpoints did not change shape,
//! only `hits.total` moved from a number to an object in 7.x.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::error::{ErrorInfo, ScrollError};
use crate::session::Record;

use super::{AdminCommand, CommandMethod, ScrollArgs, SearchClient, SearchPage};

const SCROLL_PATH: &str = "/_search/scroll";

/// HTTP client for the Elasticsearch search and scroll APIs
pub struct ElasticClient {
    http: reqwest::Client,
    base_urls: Vec<String>,
    next_host: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    #[serde(default)]
    timed_out: bool,
    hits: Option<Hits>,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type", default)]
    kind: Option<String>,
    #[serde(rename = "_source", default)]
    source: Option<Box<RawValue>>,
}

impl ElasticClient {
    /// Create a client spreading requests over `hosts`
    ///
    /// # Arguments
    /// * `hosts` - Host names or addresses, without scheme or port
    /// * `port` - Port shared by every host
    /// * `tls` - Use https
    /// * `timeout` - Per-request timeout
    pub fn new(hosts: &[String], port: u16, tls: bool, timeout: Duration) -> Result<Self, ScrollError> {
        let scheme = if tls { "https" } else { "http" };
        let base_urls: Vec<String> = hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(|h| format!("{scheme}://{h}:{port}"))
            .collect();

        if base_urls.is_empty() {
            return Err(ScrollError::Connection("no hosts configured".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScrollError::Connection(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_urls,
            next_host: AtomicUsize::new(0),
        })
    }

    /// Pick the next host round-robin
    fn base_url(&self) -> &str {
        let i = self.next_host.fetch_add(1, Ordering::Relaxed) % self.base_urls.len();
        &self.base_urls[i]
    }

    fn search_url(&self, collection: &str, kind: &str) -> String {
        if kind.is_empty() {
            format!("{}/{collection}/_search", self.base_url())
        } else {
            format!("{}/{collection}/{kind}/_search", self.base_url())
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, ScrollError> {
        let resp = request
            .send()
            .await
            .map_err(|e| ScrollError::Connection(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ScrollError::Connection(format!("reading response: {e}")))?;

        trace!("{} response, {} bytes", status, body.len());

        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(ScrollError::Protocol(ErrorInfo::from_http_body(status.as_u16(), &body)))
        }
    }
}

#[async_trait]
impl SearchClient for ElasticClient {
    async fn search(
        &self,
        collection: &str,
        kind: &str,
        args: &ScrollArgs,
        body: &Value,
    ) -> Result<SearchPage, ScrollError> {
        let url = self.search_url(collection, kind);
        debug!("Opening scroll: {}", url);

        let request = self
            .http
            .post(&url)
            .query(&[("scroll", args.keepalive.clone()), ("size", args.page_size.to_string())])
            .header("content-type", "application/json")
            .body(body.to_string());

        let raw = self.send(request).await?;
        decode_search_response(&raw)
    }

    async fn continue_scroll(&self, args: &ScrollArgs, token: &str) -> Result<SearchPage, ScrollError> {
        let url = format!("{}{SCROLL_PATH}", self.base_url());
        let body = json!({ "scroll": args.keepalive, "scroll_id": token });

        let request = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .body(body.to_string());

        let raw = self.send(request).await?;
        decode_search_response(&raw)
    }

    async fn command(&self, command: &AdminCommand) -> Result<Vec<u8>, ScrollError> {
        let method = match command.method {
            CommandMethod::Get => Method::GET,
            CommandMethod::Post => Method::POST,
            CommandMethod::Put => Method::PUT,
            CommandMethod::Delete => Method::DELETE,
        };
        let url = format!("{}{}", self.base_url(), command.path);

        let mut request = self.http.request(method, &url).query(&command.params);
        if !command.body.is_null() {
            request = request
                .header("content-type", "application/json")
                .body(command.body.to_string());
        }

        self.send(request).await
    }

    fn release_command(&self, tokens: &[String]) -> Option<AdminCommand> {
        if tokens.is_empty() {
            return None;
        }
        Some(AdminCommand {
            method: CommandMethod::Delete,
            path: SCROLL_PATH.to_string(),
            params: Vec::new(),
            body: json!({ "scroll_id": tokens }),
        })
    }

    fn default_query(&self) -> Value {
        json!({
            "query": { "match_all": {} },
            "sort": ["_doc"]
        })
    }
}

/// Decode a search or scroll response body into a page
pub(crate) fn decode_search_response(body: &[u8]) -> Result<SearchPage, ScrollError> {
    let resp: SearchResponse =
        serde_json::from_slice(body).map_err(|e| ScrollError::Decode(e.to_string()))?;

    let hits = resp
        .hits
        .ok_or_else(|| ScrollError::Decode("response has no hits".to_string()))?;
    let token = resp
        .scroll_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ScrollError::Decode("response has no scroll id".to_string()))?;

    let total = hits.total.map(|t| match t {
        TotalHits::Count(n) | TotalHits::Object { value: n } => n,
    });

    let records = hits
        .hits
        .into_iter()
        .map(|h| Record {
            id: h.id,
            collection: h.index,
            kind: h.kind.unwrap_or_default(),
            payload: h.source.map(|s| s.get().as_bytes().to_vec()).unwrap_or_default(),
        })
        .collect();

    Ok(SearchPage {
        records,
        token,
        total,
        timed_out: resp.timed_out,
    })
}
