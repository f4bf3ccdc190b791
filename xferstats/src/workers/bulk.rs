use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use rand::Rng;
use tracing::{info, warn};
use xferstats_config::shared::BatchConfig;

use crate::error::IngestResult;
use crate::metrics::{
    XFER_BULK_FLUSH_DURATION_SECONDS, XFER_BULK_RETRIES_TOTAL, XFER_RECORDS_FAILED_TOTAL,
    XFER_RECORDS_WRITTEN_TOTAL,
};
use crate::store::{ItemFailure, PartitionStore};
use crate::types::UpsertOperation;

/// Exponential backoff before retry number `attempt + 1`: `initial * 2^attempt`, capped at
/// `max`.
pub fn backoff_duration(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let shift = attempt.min(31);
    initial.saturating_mul(1u32 << shift).min(max)
}

/// Adds up to a quarter of `delay` of random jitter, staying within `max`.
fn with_jitter(delay: Duration, max: Duration) -> Duration {
    let jitter_ms = (delay.as_millis() / 4) as u64;
    if jitter_ms == 0 {
        return delay;
    }

    let jitter = rand::thread_rng().gen_range(0..=jitter_ms);
    (delay + Duration::from_millis(jitter)).min(max)
}

/// Counters accumulated by a [`BulkWriter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub written: u64,
    pub failed: u64,
    pub batches: u64,
    pub retries: u64,
}

/// Buffers upserts and writes them in batches.
///
/// A batch is flushed once it holds `max_size` operations and when the writer is finished.
/// Failed requests are retried with exponential backoff: a request that failed as a whole is
/// sent again in full, while only the retryable items of a partially applied request are.
#[derive(Debug)]
pub struct BulkWriter<'a, S> {
    store: &'a S,
    config: BatchConfig,
    pending: Vec<UpsertOperation>,
    stats: FlushStats,
}

impl<'a, S> BulkWriter<'a, S>
where
    S: PartitionStore,
{
    pub fn new(store: &'a S, config: BatchConfig) -> Self {
        Self {
            store,
            pending: Vec::with_capacity(config.max_size),
            config,
            stats: FlushStats::default(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> FlushStats {
        self.stats
    }

    /// Buffers `operation`, flushing when the batch is full.
    ///
    /// Returns `true` if a flush happened.
    pub async fn push(&mut self, operation: UpsertOperation) -> IngestResult<bool> {
        self.pending.push(operation);
        if self.pending.len() < self.config.max_size {
            return Ok(false);
        }

        self.flush().await?;

        Ok(true)
    }

    /// Writes all buffered operations.
    pub async fn flush(&mut self) -> IngestResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let operations = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.config.max_size),
        );
        let batch_size = operations.len();

        let started = Instant::now();
        let result = self.write_with_retries(operations).await;
        histogram!(XFER_BULK_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        let (written, failed) = result?;

        self.stats.batches += 1;
        self.stats.written += written;
        self.stats.failed += failed;
        counter!(XFER_RECORDS_WRITTEN_TOTAL).increment(written);
        counter!(XFER_RECORDS_FAILED_TOTAL).increment(failed);

        info!(
            batch_size,
            written,
            failed,
            total_written = self.stats.written,
            "flushed batch"
        );

        Ok(())
    }

    /// Flushes what is left and returns the final counters.
    pub async fn finish(mut self) -> IngestResult<FlushStats> {
        self.flush().await?;

        Ok(self.stats)
    }

    /// Returns the number of written and failed operations.
    async fn write_with_retries(
        &mut self,
        mut operations: Vec<UpsertOperation>,
    ) -> IngestResult<(u64, u64)> {
        let initial = Duration::from_millis(self.config.initial_backoff_ms);
        let max = Duration::from_millis(self.config.max_backoff_ms);

        let mut written = 0u64;
        let mut failed = 0u64;
        let mut attempt = 0u32;

        loop {
            match self.store.bulk_upsert(&operations).await {
                Ok(response) => {
                    written += (operations.len() - response.failures.len()) as u64;

                    let (retryable, rejected): (Vec<ItemFailure>, Vec<ItemFailure>) = response
                        .failures
                        .into_iter()
                        .partition(ItemFailure::is_retryable);

                    for failure in &rejected {
                        warn!(
                            id = %failure.id,
                            status = failure.status,
                            reason = %failure.reason,
                            "store rejected record"
                        );
                    }
                    failed += rejected.len() as u64;

                    if retryable.is_empty() {
                        return Ok((written, failed));
                    }

                    if attempt >= self.config.max_retries {
                        for failure in &retryable {
                            warn!(
                                id = %failure.id,
                                status = failure.status,
                                reason = %failure.reason,
                                "record still failing after the last retry"
                            );
                        }
                        failed += retryable.len() as u64;

                        return Ok((written, failed));
                    }

                    operations = retryable
                        .iter()
                        .filter_map(|failure| operations.get(failure.index).cloned())
                        .collect();
                    warn!(
                        attempt,
                        retrying = operations.len(),
                        "some records failed with a retryable status"
                    );
                }
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }

                    warn!(attempt, error = %err, "bulk request failed, retrying the batch");
                }
            }

            let delay = with_jitter(backoff_duration(attempt, initial, max), max);
            tokio::time::sleep(delay).await;

            attempt += 1;
            self.stats.retries += 1;
            counter!(XFER_BULK_RETRIES_TOTAL).increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::identity::record_id;
    use crate::partition::PARTITION_SCHEMA;
    use crate::store::memory::MemoryStore;

    const PARTITION: &str = "xfer-2020.01.02";

    fn operation(offset: u64) -> UpsertOperation {
        UpsertOperation {
            partition: PARTITION.to_string(),
            id: record_id("line", "host", offset),
            document: Map::new(),
        }
    }

    fn config(max_size: usize) -> BatchConfig {
        BatchConfig {
            max_size,
            ..BatchConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let initial = Duration::from_millis(500);
        let max = Duration::from_millis(10_000);

        assert_eq!(backoff_duration(0, initial, max), Duration::from_millis(500));
        assert_eq!(backoff_duration(1, initial, max), Duration::from_millis(1_000));
        assert_eq!(backoff_duration(3, initial, max), Duration::from_millis(4_000));
    }

    #[test]
    fn backoff_caps_at_max() {
        let initial = Duration::from_millis(500);
        let max = Duration::from_millis(10_000);

        assert_eq!(backoff_duration(5, initial, max), max);
        assert_eq!(backoff_duration(u32::MAX, initial, max), max);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let delay = Duration::from_millis(1_000);
        let max = Duration::from_millis(1_100);

        for _ in 0..100 {
            let jittered = with_jitter(delay, max);
            assert!(jittered >= delay);
            assert!(jittered <= max);
        }
    }

    #[tokio::test]
    async fn flushes_when_the_batch_is_full() {
        let store = MemoryStore::new();
        store
            .ensure_partition(PARTITION, &PARTITION_SCHEMA)
            .await
            .unwrap();
        let mut writer = BulkWriter::new(&store, config(2));

        assert!(!writer.push(operation(1)).await.unwrap());
        assert!(writer.push(operation(2)).await.unwrap());
        assert!(!writer.push(operation(3)).await.unwrap());
        assert_eq!(writer.pending(), 1);
        assert_eq!(store.total_documents().await, 2);

        let stats = writer.finish().await.unwrap();

        assert_eq!(store.total_documents().await, 3);
        assert_eq!(store.bulk_requests().await, 2);
        assert_eq!(
            stats,
            FlushStats {
                written: 3,
                failed: 0,
                batches: 2,
                retries: 0,
            }
        );
    }

    #[tokio::test]
    async fn finishing_an_empty_writer_sends_nothing() {
        let store = MemoryStore::new();
        let writer = BulkWriter::new(&store, config(10));

        let stats = writer.finish().await.unwrap();

        assert_eq!(stats, FlushStats::default());
        assert_eq!(store.bulk_requests().await, 0);
    }

    #[tokio::test]
    async fn non_retryable_failures_are_counted_without_retrying() {
        let store = MemoryStore::new();
        let mut writer = BulkWriter::new(&store, config(10));

        writer.push(operation(1)).await.unwrap();
        let stats = writer.finish().await.unwrap();

        assert_eq!(stats.written, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retries, 0);
        assert_eq!(store.bulk_requests().await, 1);
    }
}
