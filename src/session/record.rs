use std::fmt;

/// One retrieved document
///
/// `payload` is opaque to the pipeline. It may be empty (for example when the
/// index stores no source); an empty payload is an ordinary record, never an
/// end-of-data marker.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    /// Identifier, unique within `collection`
    pub id: String,
    /// Index or collection the record came from
    pub collection: String,
    /// Document sub-type (empty when the backend has none)
    pub kind: String,
    /// Raw serialized document
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        collection: impl Into<String>,
        kind: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            kind: kind.into(),
            payload,
        }
    }
}

// Payloads can be megabytes; log their size, not their bytes.
impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("collection", &self.collection)
            .field("kind", &self.kind)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_payload() {
        let record = Record::new("1", "idx", "doc", b"{\"secret\":true}".to_vec());
        let out = format!("{record:?}");
        assert!(out.contains("payload_len: 15"));
        assert!(!out.contains("secret"));
    }
}
