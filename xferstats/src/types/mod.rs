//! Core data types flowing through the ingestion pipeline.

mod entry;
mod geo;
mod record;
mod window;

pub use entry::RawLogEntry;
pub use geo::GeoAnnotation;
pub use record::{
    CREATE_DATE_FIELD, DEST_FIELD, DEST_RAW_FIELD, DOWNLOAD_TAG, MetricValue, PEER_STATS_TAG, ParsedLine,
    ParsedTransferRecord, RecordId, TransferDirection, UPLOAD_TAG, UpsertOperation,
};
pub use window::TimeWindow;
