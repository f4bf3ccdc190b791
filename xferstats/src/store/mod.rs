//! Day-partitioned stores receiving the enriched records.

mod base;
pub mod memory;

pub use base::{BulkResponse, ItemFailure, PartitionStore, is_retryable_status};
