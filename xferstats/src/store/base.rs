use std::future::Future;

use crate::error::IngestResult;
use crate::partition::PartitionSchema;
use crate::types::{RecordId, UpsertOperation};

/// Returns `true` for item statuses worth retrying: throttling and server errors.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// A single operation of a bulk request that was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Position of the operation in the submitted slice.
    pub index: usize,
    pub id: RecordId,
    pub status: u16,
    pub reason: String,
}

impl ItemFailure {
    pub fn is_retryable(&self) -> bool {
        is_retryable_status(self.status)
    }
}

/// Outcome of a bulk request that reached the store.
///
/// An empty failure list means every operation was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub failures: Vec<ItemFailure>,
}

impl BulkResponse {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Store of day partitions addressed by name, written through idempotent upserts.
///
/// Writing an operation whose id already exists in the partition replaces the stored
/// document, so replaying a window converges to the same state.
pub trait PartitionStore {
    /// Returns the name of the store.
    fn name() -> &'static str;

    /// Creates `partition` with `schema` unless it already exists.
    ///
    /// Must succeed when another writer creates the partition concurrently.
    fn ensure_partition(
        &self,
        partition: &str,
        schema: &PartitionSchema,
    ) -> impl Future<Output = IngestResult<()>> + Send;

    /// Applies `operations` in one request.
    ///
    /// Returns an error only when the request as a whole failed; rejected operations are
    /// reported in the [`BulkResponse`].
    fn bulk_upsert(
        &self,
        operations: &[UpsertOperation],
    ) -> impl Future<Output = IngestResult<BulkResponse>> + Send;
}
