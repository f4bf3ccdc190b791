//! Ingestion of file-transfer logs into day-partitioned statistics indices.
//!
//! Raw log entries are read window by window from a [`source::LogSource`], parsed by
//! [`parser::LineParser`], annotated by [`geo::GeoEnricher`], given a deterministic
//! [`types::RecordId`], routed to the day partition of their own event time by
//! [`partition::PartitionRouter`] and upserted in batches by [`workers::bulk::BulkWriter`].
//! [`pipeline::Pipeline`] plans the windows and runs them on a bounded worker pool.

pub mod clients;
pub mod connector;
pub mod conversions;
pub mod error;
pub mod geo;
pub mod identity;
mod macros;
pub mod metrics;
pub mod parser;
pub mod partition;
pub mod pipeline;
pub mod planner;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
