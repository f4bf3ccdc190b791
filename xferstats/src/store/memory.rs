use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::connector::Connector;
use crate::error::IngestResult;
use crate::partition::PartitionSchema;
use crate::store::{BulkResponse, ItemFailure, PartitionStore};
use crate::types::UpsertOperation;

#[derive(Debug)]
struct Partition {
    schema: PartitionSchema,
    documents: HashMap<String, Map<String, Value>>,
}

#[derive(Debug, Default)]
struct Inner {
    partitions: HashMap<String, Partition>,
    bulk_requests: usize,
}

/// In-memory partition store for tests and local runs.
///
/// Behaves like the real store where it matters: writes to a partition that was never
/// created are rejected item by item, documents whose declared fields do not fit the
/// partition schema are rejected as mapping errors, and writing an existing id replaces the
/// document. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all partitions, sorted.
    pub async fn partitions(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut partitions = inner.partitions.keys().cloned().collect::<Vec<_>>();
        partitions.sort();
        partitions
    }

    pub async fn schema(&self, partition: &str) -> Option<PartitionSchema> {
        let inner = self.inner.lock().await;
        inner.partitions.get(partition).map(|p| p.schema)
    }

    /// Returns a copy of the documents of `partition` keyed by id.
    pub async fn documents(&self, partition: &str) -> HashMap<String, Map<String, Value>> {
        let inner = self.inner.lock().await;
        inner
            .partitions
            .get(partition)
            .map(|p| p.documents.clone())
            .unwrap_or_default()
    }

    pub async fn document(&self, partition: &str, id: &str) -> Option<Map<String, Value>> {
        let inner = self.inner.lock().await;
        inner
            .partitions
            .get(partition)
            .and_then(|p| p.documents.get(id).cloned())
    }

    /// Returns the number of documents across all partitions.
    pub async fn total_documents(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.partitions.values().map(|p| p.documents.len()).sum()
    }

    /// Returns the number of bulk requests received so far.
    pub async fn bulk_requests(&self) -> usize {
        self.inner.lock().await.bulk_requests
    }

}

impl PartitionStore for MemoryStore {
    fn name() -> &'static str {
        "memory"
    }

    async fn ensure_partition(&self, partition: &str, schema: &PartitionSchema) -> IngestResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .partitions
            .entry(partition.to_string())
            .or_insert_with(|| Partition {
                schema: *schema,
                documents: HashMap::new(),
            });

        Ok(())
    }

    async fn bulk_upsert(&self, operations: &[UpsertOperation]) -> IngestResult<BulkResponse> {
        let mut inner = self.inner.lock().await;
        inner.bulk_requests += 1;

        let mut response = BulkResponse::success();
        for (index, operation) in operations.iter().enumerate() {
            match inner.partitions.get_mut(&operation.partition) {
                Some(partition) => match partition.schema.check_document(&operation.document) {
                    Ok(()) => {
                        partition
                            .documents
                            .insert(operation.id.to_string(), operation.document.clone());
                    }
                    Err(reason) => response.failures.push(ItemFailure {
                        index,
                        id: operation.id.clone(),
                        status: 400,
                        reason,
                    }),
                },
                None => response.failures.push(ItemFailure {
                    index,
                    id: operation.id.clone(),
                    status: 404,
                    reason: format!(
                        "index_not_found_exception: no such index [{}]",
                        operation.partition
                    ),
                }),
            }
        }

        Ok(response)
    }
}

impl Connector for MemoryStore {
    type Connection = MemoryStore;

    async fn connect(&self) -> IngestResult<Self::Connection> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::identity::record_id;
    use crate::partition::PARTITION_SCHEMA;

    fn operation(partition: &str, offset: u64, bytes: u64) -> UpsertOperation {
        let mut document = Map::new();
        document.insert("Bytes".to_string(), json!(bytes));

        UpsertOperation {
            partition: partition.to_string(),
            id: record_id("line", "host", offset),
            document,
        }
    }

    #[tokio::test]
    async fn upserts_replace_documents_with_the_same_id() {
        let store = MemoryStore::new();
        store
            .ensure_partition("xfer-2020.01.02", &PARTITION_SCHEMA)
            .await
            .unwrap();

        store
            .bulk_upsert(&[operation("xfer-2020.01.02", 1, 10)])
            .await
            .unwrap();
        let response = store
            .bulk_upsert(&[operation("xfer-2020.01.02", 1, 20)])
            .await
            .unwrap();

        assert!(response.is_complete());
        assert_eq!(store.total_documents().await, 1);
        let id = record_id("line", "host", 1);
        let document = store.document("xfer-2020.01.02", id.as_str()).await.unwrap();
        assert_eq!(document["Bytes"], json!(20));
    }

    #[tokio::test]
    async fn writes_to_missing_partitions_are_rejected() {
        let store = MemoryStore::new();
        store
            .ensure_partition("xfer-2020.01.02", &PARTITION_SCHEMA)
            .await
            .unwrap();

        let response = store
            .bulk_upsert(&[
                operation("xfer-2020.01.02", 1, 10),
                operation("xfer-2020.01.03", 2, 10),
            ])
            .await
            .unwrap();

        assert_eq!(response.failures.len(), 1);
        assert_eq!(response.failures[0].index, 1);
        assert_eq!(response.failures[0].status, 404);
        assert!(!response.failures[0].is_retryable());
        assert_eq!(store.total_documents().await, 1);
    }

    #[tokio::test]
    async fn documents_that_do_not_fit_the_schema_are_rejected() {
        let store = MemoryStore::new();
        store
            .ensure_partition("xfer-2020.01.02", &PARTITION_SCHEMA)
            .await
            .unwrap();
        let mut invalid = operation("xfer-2020.01.02", 2, 10);
        invalid
            .document
            .insert("dest".to_string(), json!("8.8.8.8:9618"));

        let response = store
            .bulk_upsert(&[operation("xfer-2020.01.02", 1, 10), invalid])
            .await
            .unwrap();

        assert_eq!(response.failures.len(), 1);
        assert_eq!(response.failures[0].index, 1);
        assert_eq!(response.failures[0].status, 400);
        assert!(response.failures[0].reason.contains("mapper_parsing_exception"));
        assert!(!response.failures[0].is_retryable());
        assert_eq!(store.total_documents().await, 1);
    }

    #[tokio::test]
    async fn ensuring_twice_keeps_documents() {
        let store = MemoryStore::new();
        store
            .ensure_partition("xfer-2020.01.02", &PARTITION_SCHEMA)
            .await
            .unwrap();
        store
            .bulk_upsert(&[operation("xfer-2020.01.02", 1, 10)])
            .await
            .unwrap();
        store
            .ensure_partition("xfer-2020.01.02", &PARTITION_SCHEMA)
            .await
            .unwrap();

        assert_eq!(store.total_documents().await, 1);
        assert_eq!(
            store.schema("xfer-2020.01.02").await,
            Some(PARTITION_SCHEMA)
        );
    }
}
