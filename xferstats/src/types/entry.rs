use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::bail;
use crate::ingest_error;
use crate::error::{ErrorKind, IngestResult};

/// Field of the source document holding the time the entry was shipped.
const TIMESTAMP_FIELD: &str = "@timestamp";

/// One raw transfer log entry as found in the source index.
///
/// Besides the fields the pipeline reads, the whole source document is kept in `document` so
/// the stored record carries everything the log shipper attached to the line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLogEntry {
    pub message: String,
    pub host: String,
    /// Position of the line within the host's log stream.
    pub offset: u64,
    pub tags: Vec<String>,
    /// Time the entry was shipped, used to select entries for a window.
    pub timestamp: DateTime<Utc>,
    pub document: Map<String, Value>,
}

impl RawLogEntry {
    /// Builds an entry with a minimal source document holding just its own fields.
    pub fn new(
        message: impl Into<String>,
        host: impl Into<String>,
        offset: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let message = message.into();
        let host = host.into();

        let mut document = Map::new();
        document.insert("message".to_string(), Value::String(message.clone()));
        document.insert("host".to_string(), Value::String(host.clone()));
        document.insert("offset".to_string(), Value::from(offset));
        document.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::String(timestamp.to_rfc3339()),
        );

        Self {
            message,
            host,
            offset,
            tags: Vec::new(),
            timestamp,
            document,
        }
    }

    /// Attaches pre-existing tags to the entry.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self.document.insert(
            "tags".to_string(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );
        self
    }

    /// Extracts an entry from a source document.
    ///
    /// `host` may be a plain string or an object with a `name` field, and `offset` may live at
    /// the top level or under `log.offset`, covering both older and newer log shippers.
    pub fn from_document(document: Map<String, Value>) -> IngestResult<Self> {
        let Some(message) = document.get("message").and_then(Value::as_str) else {
            bail!(
                ErrorKind::InvalidData,
                "Source document has no message",
                detail = document_keys(&document)
            );
        };

        let host = match document.get("host") {
            Some(Value::String(host)) => host.clone(),
            Some(Value::Object(host)) => match host.get("name").and_then(Value::as_str) {
                Some(name) => name.to_string(),
                None => bail!(ErrorKind::InvalidData, "Source document host has no name"),
            },
            _ => bail!(
                ErrorKind::InvalidData,
                "Source document has no host",
                detail = document_keys(&document)
            ),
        };

        let offset = document
            .get("offset")
            .or_else(|| document.get("log").and_then(|log| log.get("offset")))
            .and_then(Value::as_u64);
        let Some(offset) = offset else {
            bail!(
                ErrorKind::InvalidData,
                "Source document has no offset",
                detail = document_keys(&document)
            );
        };

        let Some(raw_timestamp) = document.get(TIMESTAMP_FIELD).and_then(Value::as_str) else {
            bail!(
                ErrorKind::InvalidData,
                "Source document has no @timestamp",
                detail = document_keys(&document)
            );
        };
        let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
            .map_err(|err| {
                ingest_error!(
                    ErrorKind::InvalidData,
                    "Source document has an invalid @timestamp",
                    format!("{raw_timestamp}: {err}"),
                    source: err
                )
            })?
            .with_timezone(&Utc);

        let tags = document
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            message: message.to_string(),
            host,
            offset,
            tags,
            timestamp,
            document,
        })
    }
}

fn document_keys(document: &Map<String, Value>) -> String {
    let keys = document.keys().map(String::as_str).collect::<Vec<_>>();
    format!("document fields: [{}]", keys.join(", "))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn reads_flat_documents() {
        let entry = RawLogEntry::from_document(as_map(json!({
            "@timestamp": "2020-01-02T10:00:05Z",
            "message": "01/02/2020 10:00:00 (peer stats): Bytes: 1024",
            "host": "submit-1.example.org",
            "offset": 4096,
            "tags": ["beats_input_codec_plain_applied"],
        })))
        .unwrap();

        assert_eq!(entry.host, "submit-1.example.org");
        assert_eq!(entry.offset, 4096);
        assert_eq!(entry.tags, vec!["beats_input_codec_plain_applied"]);
        assert_eq!(
            entry.timestamp,
            Utc.with_ymd_and_hms(2020, 1, 2, 10, 0, 5).unwrap()
        );
    }

    #[test]
    fn reads_nested_host_and_log_offset() {
        let entry = RawLogEntry::from_document(as_map(json!({
            "@timestamp": "2020-01-02T10:00:05.123+00:00",
            "message": "line",
            "host": {"name": "submit-2"},
            "log": {"offset": 17},
        })))
        .unwrap();

        assert_eq!(entry.host, "submit-2");
        assert_eq!(entry.offset, 17);
        assert!(entry.tags.is_empty());
    }

    #[test]
    fn rejects_documents_without_message() {
        let err = RawLogEntry::from_document(as_map(json!({
            "@timestamp": "2020-01-02T10:00:05Z",
            "host": "submit-1",
            "offset": 1,
        })))
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_documents_with_an_invalid_timestamp() {
        let err = RawLogEntry::from_document(as_map(json!({
            "@timestamp": "yesterday",
            "message": "line",
            "host": "submit-1",
            "offset": 1,
        })))
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
