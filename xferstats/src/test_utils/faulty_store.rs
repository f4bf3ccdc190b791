use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connector::Connector;
use crate::error::{ErrorKind, IngestResult};
use crate::ingest_error;
use crate::partition::PartitionSchema;
use crate::store::{BulkResponse, ItemFailure, PartitionStore};
use crate::types::UpsertOperation;

/// Failure injected into one bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The whole request fails and nothing is written.
    Request,
    /// The first operation is rejected with the status; the others are written.
    FirstItem(u16),
}

#[derive(Debug, Default)]
struct Inner {
    faults: VecDeque<Fault>,
    bulk_requests: usize,
}

/// Store wrapper that fails scripted bulk requests, one fault per request, in order.
#[derive(Debug, Clone)]
pub struct FaultyStore<S> {
    store: S,
    inner: Arc<Mutex<Inner>>,
}

impl<S> FaultyStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub async fn inject(&self, faults: impl IntoIterator<Item = Fault>) {
        self.inner.lock().await.faults.extend(faults);
    }

    /// Returns the number of bulk requests received, failed ones included.
    pub async fn bulk_requests(&self) -> usize {
        self.inner.lock().await.bulk_requests
    }

    pub fn inner(&self) -> &S {
        &self.store
    }
}

impl<S> PartitionStore for FaultyStore<S>
where
    S: PartitionStore + Sync,
{
    fn name() -> &'static str {
        "faulty"
    }

    async fn ensure_partition(&self, partition: &str, schema: &PartitionSchema) -> IngestResult<()> {
        self.store.ensure_partition(partition, schema).await
    }

    async fn bulk_upsert(&self, operations: &[UpsertOperation]) -> IngestResult<BulkResponse> {
        let fault = {
            let mut inner = self.inner.lock().await;
            inner.bulk_requests += 1;
            inner.faults.pop_front()
        };

        match fault {
            None => self.store.bulk_upsert(operations).await,
            Some(Fault::Request) => Err(ingest_error!(
                ErrorKind::BulkWriteFailed,
                "Injected bulk request failure"
            )),
            Some(Fault::FirstItem(status)) => {
                let Some((first, rest)) = operations.split_first() else {
                    return Ok(BulkResponse::success());
                };

                let mut response = self.store.bulk_upsert(rest).await?;
                for failure in &mut response.failures {
                    failure.index += 1;
                }
                response.failures.insert(
                    0,
                    ItemFailure {
                        index: 0,
                        id: first.id.clone(),
                        status,
                        reason: "injected item failure".to_string(),
                    },
                );

                Ok(response)
            }
        }
    }
}

impl<S> Connector for FaultyStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    type Connection = FaultyStore<S>;

    async fn connect(&self) -> IngestResult<Self::Connection> {
        Ok(self.clone())
    }
}
