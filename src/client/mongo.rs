//! MongoDB cursor transport
//!
//! Drives server cursors with raw commands instead of the driver's `Cursor`
//! type so that cursor ids stay visible as tokens and can be killed
//! explicitly on shutdown.

use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mongodb::Database;
use mongodb::options::ClientOptions;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ScrollError;
use crate::session::Record;

use super::{AdminCommand, CommandMethod, ScrollArgs, SearchClient, SearchPage};

/// Token of a cursor the server has already closed.
const EXHAUSTED_CURSOR: &str = "0";

/// Client issuing `find`, `getMore` and `killCursors` against one collection
pub struct MongoClient {
    database: Database,
    collection: String,
}

impl MongoClient {
    /// Connect to the given hosts
    ///
    /// # Arguments
    /// * `hosts` - Host names, all sharing `port`
    /// * `port` - Server port
    /// * `database` - Database holding the collection
    /// * `collection` - Collection to page through
    /// * `timeout` - Connect and server-selection timeout
    pub async fn connect(
        hosts: &[String],
        port: u16,
        database: &str,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self, ScrollError> {
        let seeds: Vec<String> = hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(|h| format!("{h}:{port}"))
            .collect();
        if seeds.is_empty() {
            return Err(ScrollError::Connection("no hosts configured".to_string()));
        }

        let uri = format!("mongodb://{}/", seeds.join(","));
        let mut options = ClientOptions::parse(&uri).await?;
        options.app_name = Some("scrollpump".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = mongodb::Client::with_options(options)?;
        debug!("MongoDB client created for {}", uri);

        Ok(Self {
            database: client.database(database),
            collection: collection.to_string(),
        })
    }

    async fn run(&self, command: Document) -> Result<Document, ScrollError> {
        Ok(self.database.run_command(command).await?)
    }

    fn page_from_reply(&self, reply: &Document, batch_key: &str) -> Result<SearchPage, ScrollError> {
        let cursor = reply
            .get_document("cursor")
            .map_err(|e| ScrollError::Decode(format!("reply has no cursor: {e}")))?;
        let id = cursor
            .get_i64("id")
            .map_err(|e| ScrollError::Decode(format!("cursor has no id: {e}")))?;
        let batch = cursor
            .get_array(batch_key)
            .map_err(|e| ScrollError::Decode(format!("cursor has no {batch_key}: {e}")))?;

        let records = batch
            .iter()
            .map(|doc| match doc {
                Bson::Document(d) => document_to_record(&self.collection, d),
                other => Err(ScrollError::Decode(format!(
                    "expected document in {batch_key}, found {:?}",
                    other.element_type()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchPage {
            records,
            token: id.to_string(),
            total: None,
            timed_out: false,
        })
    }
}

#[async_trait]
impl SearchClient for MongoClient {
    async fn search(
        &self,
        collection: &str,
        _kind: &str,
        args: &ScrollArgs,
        body: &Value,
    ) -> Result<SearchPage, ScrollError> {
        let filter = json_to_document(body)?;
        let reply = self
            .run(doc! {
                "find": collection,
                "filter": filter,
                "batchSize": batch_size(args),
            })
            .await?;
        self.page_from_reply(&reply, "firstBatch")
    }

    async fn continue_scroll(&self, args: &ScrollArgs, token: &str) -> Result<SearchPage, ScrollError> {
        if token == EXHAUSTED_CURSOR {
            return Ok(SearchPage {
                token: token.to_string(),
                ..Default::default()
            });
        }

        let id: i64 = token
            .parse()
            .map_err(|_| ScrollError::Decode(format!("invalid cursor id: {token}")))?;
        let reply = self
            .run(doc! {
                "getMore": id,
                "collection": self.collection.as_str(),
                "batchSize": batch_size(args),
            })
            .await?;
        self.page_from_reply(&reply, "nextBatch")
    }

    /// Runs `command.body` as a database command; method and path are ignored.
    async fn command(&self, command: &AdminCommand) -> Result<Vec<u8>, ScrollError> {
        let reply = self.run(json_to_document(&command.body)?).await?;
        serde_json::to_vec(&Bson::Document(reply).into_relaxed_extjson())
            .map_err(|e| ScrollError::Decode(e.to_string()))
    }

    fn release_command(&self, tokens: &[String]) -> Option<AdminCommand> {
        let ids: Vec<i64> = tokens
            .iter()
            .filter(|t| t.as_str() != EXHAUSTED_CURSOR)
            .filter_map(|t| t.parse().ok())
            .collect();
        if ids.is_empty() {
            return None;
        }

        Some(AdminCommand {
            method: CommandMethod::Post,
            path: self.database.name().to_string(),
            params: Vec::new(),
            body: json!({
                "killCursors": self.collection,
                "cursors": ids.iter().map(|id| json!({ "$numberLong": id.to_string() })).collect::<Vec<_>>(),
            }),
        })
    }

    fn default_query(&self) -> Value {
        json!({})
    }
}

fn batch_size(args: &ScrollArgs) -> i32 {
    i32::try_from(args.page_size).unwrap_or(i32::MAX)
}

fn json_to_document(value: &Value) -> Result<Document, ScrollError> {
    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(ScrollError::Decode(format!(
            "expected a JSON object, found {:?}",
            other.element_type()
        ))),
        Err(e) => Err(ScrollError::Decode(e.to_string())),
    }
}

fn document_to_record(collection: &str, doc: &Document) -> Result<Record, ScrollError> {
    let id = match doc.get("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(Bson::String(s)) => s.clone(),
        Some(other) => other.clone().into_relaxed_extjson().to_string(),
        None => String::new(),
    };
    let payload = serde_json::to_vec(&Bson::Document(doc.clone()).into_relaxed_extjson())
        .map_err(|e| ScrollError::Decode(format!("document {id}: {e}")))?;

    Ok(Record {
        id,
        collection: collection.to_string(),
        kind: String::new(),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn test_document_to_record() {
        let oid = ObjectId::new();
        let record = document_to_record("events", &doc! { "_id": oid, "n": 1 }).unwrap();

        assert_eq!(record.id, oid.to_hex());
        assert_eq!(record.collection, "events");
        let payload: Value = serde_json::from_slice(&record.payload).unwrap();
        assert_eq!(payload["n"], json!(1));
    }

    #[test]
    fn test_numeric_id() {
        let record = document_to_record("events", &doc! { "_id": 42_i32 }).unwrap();
        assert_eq!(record.id, "42");
    }

    #[test]
    fn test_non_finite_double_keeps_payload() {
        let record = document_to_record("events", &doc! { "_id": 1_i32, "ratio": f64::NAN }).unwrap();
        let payload: Value = serde_json::from_slice(&record.payload).unwrap();
        assert_eq!(payload["ratio"], json!({ "$numberDouble": "NaN" }));
    }

    #[test]
    fn test_json_to_document_rejects_arrays() {
        assert!(json_to_document(&json!([1, 2])).is_err());
        let doc = json_to_document(&json!({ "status": "active" })).unwrap();
        assert_eq!(doc.get_str("status").unwrap(), "active");
    }

    #[test]
    fn test_kill_cursors_body_is_valid_bson() {
        let body = json!({
            "killCursors": "events",
            "cursors": [{ "$numberLong": "123" }],
        });
        let doc = json_to_document(&body).unwrap();
        let cursors = doc.get_array("cursors").unwrap();
        assert_eq!(cursors[0], Bson::Int64(123));
    }

    #[test]
    fn test_batch_size_saturates() {
        let args = ScrollArgs {
            keepalive: "1m".into(),
            page_size: u32::MAX,
        };
        assert_eq!(batch_size(&args), i32::MAX);
    }
}
