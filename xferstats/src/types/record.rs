use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::geo::parse_destination;
use crate::types::{GeoAnnotation, RawLogEntry};

/// Tag of records describing an upload.
pub const UPLOAD_TAG: &str = "upload";

/// Tag of records describing a download.
pub const DOWNLOAD_TAG: &str = "download";

/// Tag of records unwrapped from a `(peer stats …):` sub-report.
pub const PEER_STATS_TAG: &str = "peer_stats";

/// Document field holding the event time of a stored record.
pub const CREATE_DATE_FIELD: &str = "CreateDate";

/// Metric and document field holding the destination IP address.
pub const DEST_FIELD: &str = "dest";

/// Document field keeping the destination as logged when it is not a bare IP address.
pub const DEST_RAW_FIELD: &str = "dest_raw";

/// Value of one extracted metric, after numeric coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&MetricValue> for Value {
    fn from(value: &MetricValue) -> Self {
        match value {
            MetricValue::Integer(value) => Value::from(*value),
            MetricValue::Float(value) => Value::from(*value),
            MetricValue::Text(value) => Value::String(value.clone()),
        }
    }
}

/// Direction of a transfer as seen from the host that logged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    pub fn tag(&self) -> &'static str {
        match self {
            TransferDirection::Upload => UPLOAD_TAG,
            TransferDirection::Download => DOWNLOAD_TAG,
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Fields extracted from one log line, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub event_time: DateTime<Utc>,
    pub direction: TransferDirection,
    /// Whether the line was a `(peer stats …):` sub-report.
    pub peer_stats: bool,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl ParsedLine {
    /// Returns the textual `dest` metric, the address geographic annotations are derived from.
    pub fn destination(&self) -> Option<&str> {
        self.metrics.get(DEST_FIELD).and_then(MetricValue::as_str)
    }
}

/// Deterministic identifier of a stored record, 64 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub(crate) fn new(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully enriched record, ready to be routed and written.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransferRecord {
    pub id: RecordId,
    pub event_time: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
    /// Tags of the stored record: the entry's own tags without any direction or peer stats
    /// markers, then `peer_stats` when applicable, then exactly one direction tag.
    pub tags: Vec<String>,
    pub geo: Option<GeoAnnotation>,
    source: Map<String, Value>,
}

impl ParsedTransferRecord {
    pub fn new(
        entry: &RawLogEntry,
        parsed: ParsedLine,
        geo: Option<GeoAnnotation>,
        id: RecordId,
    ) -> Self {
        let mut tags: Vec<String> = Vec::with_capacity(entry.tags.len() + 2);
        for tag in &entry.tags {
            let reserved = matches!(tag.as_str(), UPLOAD_TAG | DOWNLOAD_TAG | PEER_STATS_TAG);
            if !reserved && !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        if parsed.peer_stats {
            tags.push(PEER_STATS_TAG.to_string());
        }
        tags.push(parsed.direction.tag().to_string());

        Self {
            id,
            event_time: parsed.event_time,
            metrics: parsed.metrics,
            tags,
            geo,
            source: entry.document.clone(),
        }
    }

    pub fn direction(&self) -> TransferDirection {
        if self.tags.iter().any(|tag| tag == UPLOAD_TAG) {
            TransferDirection::Upload
        } else {
            TransferDirection::Download
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Renders the stored document.
    ///
    /// The source document is overlaid with the metrics as top-level fields, `CreateDate`,
    /// `tags` and, when geographic data is known, `geoip` and `location`.
    ///
    /// `dest` only ever holds a bare IP address. A destination logged with a port or as a
    /// contact string is reduced to its address and kept verbatim under `dest_raw`; one
    /// with no readable address is only kept under `dest_raw`.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut document = self.source.clone();

        for (name, value) in &self.metrics {
            document.insert(name.clone(), Value::from(value));
        }
        normalize_destination(&mut document);

        document.insert(
            CREATE_DATE_FIELD.to_string(),
            Value::String(self.event_time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        document.insert(
            "tags".to_string(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );

        if let Some(geo) = &self.geo {
            document.insert("geoip".to_string(), Value::Object(geo.to_document()));
            if let Some([longitude, latitude]) = geo.location() {
                document.insert(
                    "location".to_string(),
                    Value::Array(vec![Value::from(longitude), Value::from(latitude)]),
                );
            }
        }

        document
    }
}

fn normalize_destination(document: &mut Map<String, Value>) {
    let Some(raw) = document.remove(DEST_FIELD) else {
        return;
    };

    let ip = raw.as_str().and_then(parse_destination);
    if let Some(ip) = ip {
        let normalized = ip.to_string();
        if raw.as_str() != Some(normalized.as_str()) {
            document.insert(DEST_RAW_FIELD.to_string(), raw);
        }
        document.insert(DEST_FIELD.to_string(), Value::String(normalized));
    } else {
        document.insert(DEST_RAW_FIELD.to_string(), raw);
    }
}

/// One idempotent write: the document stored under `id` in `partition`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOperation {
    pub partition: String,
    pub id: RecordId,
    pub document: Map<String, Value>,
}
