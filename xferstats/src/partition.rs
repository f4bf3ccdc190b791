//! Day partitions of the statistics store.
//!
//! Records are routed by the day of their own event time, never by the window that found
//! them, so a late-shipped line still lands next to the transfers of its day.

use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Days, NaiveDate};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::IngestResult;
use crate::store::PartitionStore;
use crate::types::{CREATE_DATE_FIELD, DEST_FIELD, ParsedTransferRecord, TimeWindow};

/// Type of a field declared by the partition schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    GeoPoint,
    Ip,
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::GeoPoint => "geo_point",
            FieldType::Ip => "ip",
            FieldType::Date => "date",
        }
    }

    /// Returns whether a document value can be indexed as this type.
    ///
    /// Geo points are accepted as `[longitude, latitude]` arrays or `{"lat", "lon"}` objects.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Ip => value.as_str().is_some_and(|ip| ip.parse::<IpAddr>().is_ok()),
            FieldType::Date => value
                .as_str()
                .is_some_and(|date| DateTime::parse_from_rfc3339(date).is_ok()),
            FieldType::GeoPoint => {
                let point = match value {
                    Value::Array(items) if items.len() == 2 => {
                        items[1].as_f64().zip(items[0].as_f64())
                    }
                    Value::Object(object) => object
                        .get("lat")
                        .and_then(Value::as_f64)
                        .zip(object.get("lon").and_then(Value::as_f64)),
                    _ => None,
                };
                point.is_some_and(|(lat, lon)| {
                    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
                })
            }
        }
    }
}

/// Fields every partition declares up front. Paths are dot separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSchema {
    fields: &'static [(&'static str, FieldType)],
}

/// Schema of every day partition.
pub const PARTITION_SCHEMA: PartitionSchema = PartitionSchema {
    fields: &[
        ("location", FieldType::GeoPoint),
        (DEST_FIELD, FieldType::Ip),
        ("geoip.ip", FieldType::Ip),
        (CREATE_DATE_FIELD, FieldType::Date),
    ],
};

impl PartitionSchema {
    pub fn fields(&self) -> &'static [(&'static str, FieldType)] {
        self.fields
    }

    pub fn field_type(&self, path: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|(field, _)| *field == path)
            .map(|(_, field_type)| *field_type)
    }

    /// Checks every declared field present in `document` against its type.
    ///
    /// Returns the reason the store gives when it rejects the document.
    pub fn check_document(&self, document: &Map<String, Value>) -> Result<(), String> {
        for (path, field_type) in self.fields {
            if let Some(value) = lookup_path(document, path)
                && !field_type.accepts(value)
            {
                return Err(format!(
                    "mapper_parsing_exception: failed to parse field [{path}] of type [{}]",
                    field_type.as_str()
                ));
            }
        }

        Ok(())
    }

    /// Renders the schema as an index `mappings` body, nesting dotted paths under
    /// `properties`.
    pub fn to_mapping(&self) -> Value {
        let mut properties = Map::new();
        for (path, field_type) in self.fields {
            insert_property(&mut properties, path, *field_type);
        }

        json!({ "mappings": { "properties": properties } })
    }
}

fn lookup_path<'a>(document: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => document.get(path),
        Some((head, rest)) => document
            .get(head)
            .and_then(Value::as_object)
            .and_then(|nested| lookup_path(nested, rest)),
    }
}

fn insert_property(properties: &mut Map<String, Value>, path: &str, field_type: FieldType) {
    match path.split_once('.') {
        None => {
            properties.insert(path.to_string(), json!({ "type": field_type.as_str() }));
        }
        Some((head, rest)) => {
            let object = properties
                .entry(head.to_string())
                .or_insert_with(|| json!({ "properties": {} }));
            if let Some(nested) = object
                .get_mut("properties")
                .and_then(Value::as_object_mut)
            {
                insert_property(nested, rest, field_type);
            }
        }
    }
}

/// Maps event dates to partition names `<prefix>-YYYY.MM.DD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRouter {
    prefix: String,
}

impl PartitionRouter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn partition_for_date(&self, date: NaiveDate) -> String {
        format!("{}-{}", self.prefix, date.format("%Y.%m.%d"))
    }

    /// Returns the partition `record` belongs to, derived from its event day only.
    pub fn route(&self, record: &ParsedTransferRecord) -> String {
        self.partition_for_date(record.event_time.date_naive())
    }

    /// Returns the partitions prepared before a window is scanned: the day before its start,
    /// the day of its start and the day of its end, without duplicates.
    pub fn partitions_for_window(&self, window: &TimeWindow) -> Vec<String> {
        let start = window.start.date_naive();
        let days = [
            start.checked_sub_days(Days::new(1)),
            Some(start),
            Some(window.end.date_naive()),
        ];

        let mut partitions: Vec<String> = Vec::with_capacity(days.len());
        for day in days.into_iter().flatten() {
            let partition = self.partition_for_date(day);
            if !partitions.contains(&partition) {
                partitions.push(partition);
            }
        }

        partitions
    }

    /// Creates the window's partitions that do not exist yet and returns their names.
    pub async fn ensure_partitions<S>(
        &self,
        store: &S,
        window: &TimeWindow,
    ) -> IngestResult<Vec<String>>
    where
        S: PartitionStore,
    {
        let partitions = self.partitions_for_window(window);
        for partition in &partitions {
            store.ensure_partition(partition, &PARTITION_SCHEMA).await?;
            debug!(%partition, "partition ready");
        }

        Ok(partitions)
    }
}

/// Tracks which partitions a worker has already prepared.
#[derive(Debug, Default)]
pub struct EnsuredPartitions {
    partitions: HashSet<String>,
}

impl EnsuredPartitions {
    pub fn new<I: IntoIterator<Item = String>>(partitions: I) -> Self {
        Self {
            partitions: partitions.into_iter().collect(),
        }
    }

    pub fn contains(&self, partition: &str) -> bool {
        self.partitions.contains(partition)
    }

    pub fn insert(&mut self, partition: String) {
        self.partitions.insert(partition);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn window(start: (u32, u32), end: (u32, u32)) -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2020, 1, start.0, start.1, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, end.0, end.1, 0, 0).unwrap(),
        )
    }

    #[test]
    fn names_partitions_by_day() {
        let router = PartitionRouter::new("htcondor-xfer-stats");

        assert_eq!(
            router.partition_for_date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()),
            "htcondor-xfer-stats-2020.01.02"
        );
    }

    #[test]
    fn window_partitions_include_the_previous_day() {
        let router = PartitionRouter::new("xfer");

        assert_eq!(
            router.partitions_for_window(&window((2, 10), (2, 11))),
            vec!["xfer-2020.01.01", "xfer-2020.01.02"]
        );
        assert_eq!(
            router.partitions_for_window(&window((2, 23), (3, 0))),
            vec!["xfer-2020.01.01", "xfer-2020.01.02", "xfer-2020.01.03"]
        );
    }

    #[test]
    fn routing_uses_the_event_day_only() {
        use crate::identity::record_id;
        use crate::parser::LineParser;
        use crate::types::RawLogEntry;

        let router = PartitionRouter::new("xfer");
        let line = "12/31/2019 23:59:59 Bytes: 1";
        let shipped_at = Utc.with_ymd_and_hms(2020, 1, 5, 0, 0, 0).unwrap();
        let entry = RawLogEntry::new(line, "submit-1", 1, shipped_at);
        let parsed = LineParser::new().parse(line).unwrap();
        let record =
            ParsedTransferRecord::new(&entry, parsed, None, record_id(line, "submit-1", 1));

        assert_eq!(router.route(&record), "xfer-2019.12.31");
    }

    #[test]
    fn mapping_nests_dotted_fields() {
        let mapping = PARTITION_SCHEMA.to_mapping();

        assert_eq!(
            mapping,
            json!({
                "mappings": {
                    "properties": {
                        "location": {"type": "geo_point"},
                        "dest": {"type": "ip"},
                        "geoip": {"properties": {"ip": {"type": "ip"}}},
                        "CreateDate": {"type": "date"},
                    }
                }
            })
        );
        assert_eq!(PARTITION_SCHEMA.field_type("geoip.ip"), Some(FieldType::Ip));
        assert_eq!(PARTITION_SCHEMA.field_type("geoip"), None);
    }

    #[test]
    fn documents_are_checked_against_declared_types() {
        let valid = json!({
            "dest": "8.8.8.8",
            "geoip": {"ip": "2001:4860:4860::8888"},
            "location": [-97.822, 37.751],
            "CreateDate": "2020-01-02T10:00:00Z",
            "Bytes": 1024,
        });
        assert_eq!(
            PARTITION_SCHEMA.check_document(valid.as_object().unwrap()),
            Ok(())
        );

        let with_port = json!({"dest": "8.8.8.8:9618"});
        let reason = PARTITION_SCHEMA
            .check_document(with_port.as_object().unwrap())
            .unwrap_err();
        assert!(reason.contains("[dest] of type [ip]"));

        let swapped = json!({"location": [37.751, -197.822]});
        assert!(
            PARTITION_SCHEMA
                .check_document(swapped.as_object().unwrap())
                .is_err()
        );

        let nested = json!({"geoip": {"ip": "somewhere"}});
        let reason = PARTITION_SCHEMA
            .check_document(nested.as_object().unwrap())
            .unwrap_err();
        assert!(reason.contains("[geoip.ip]"));
    }

    #[test]
    fn geo_points_accept_arrays_and_objects() {
        assert!(FieldType::GeoPoint.accepts(&json!([-97.822, 37.751])));
        assert!(FieldType::GeoPoint.accepts(&json!({"lat": 37.751, "lon": -97.822})));
        assert!(!FieldType::GeoPoint.accepts(&json!([-97.822])));
        assert!(!FieldType::GeoPoint.accepts(&json!("37.751,-97.822")));
    }
}
