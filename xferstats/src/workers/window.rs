use std::collections::BTreeMap;
use std::fmt;
use std::pin::pin;

use futures::StreamExt;
use metrics::counter;
use tracing::{debug, info};
use xferstats_config::shared::BatchConfig;

use crate::connector::Connector;
use crate::error::{ErrorKind, IngestResult};
use crate::geo::GeoEnricher;
use crate::identity::entry_id;
use crate::metrics::{REASON_LABEL, XFER_ENTRIES_SCANNED_TOTAL, XFER_ENTRIES_SKIPPED_TOTAL};
use crate::parser::{LineParser, ParseError};
use crate::partition::{EnsuredPartitions, PARTITION_SCHEMA, PartitionRouter};
use crate::source::LogSource;
use crate::store::PartitionStore;
use crate::types::{ParsedTransferRecord, RawLogEntry, TimeWindow, UpsertOperation};
use crate::workers::bulk::BulkWriter;

/// Skip reason of source documents that could not be read as log entries.
pub const INVALID_SOURCE_DOCUMENT_REASON: &str = "invalid_source_document";

/// Progress of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Planned,
    Scanning,
    /// Records are being buffered; full batches are flushed along the way.
    Batching,
    /// The final, partial batch is being written.
    Flushing,
    Done,
}

impl fmt::Display for WindowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowPhase::Planned => "planned",
            WindowPhase::Scanning => "scanning",
            WindowPhase::Batching => "batching",
            WindowPhase::Flushing => "flushing",
            WindowPhase::Done => "done",
        };

        f.write_str(name)
    }
}

/// Outcome of a window that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub window: TimeWindow,
    /// Entries read from the source.
    pub scanned: u64,
    /// Entries that produced no record, by reason.
    pub skipped: BTreeMap<&'static str, u64>,
    pub written: u64,
    /// Records the store rejected or that still failed after the last retry.
    pub failed_writes: u64,
    pub batches: u64,
    pub retries: u64,
}

impl WindowReport {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            scanned: 0,
            skipped: BTreeMap::new(),
            written: 0,
            failed_writes: 0,
            batches: 0,
            retries: 0,
        }
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    fn record_skip(&mut self, reason: &'static str) {
        *self.skipped.entry(reason).or_default() += 1;
        counter!(XFER_ENTRIES_SKIPPED_TOTAL, REASON_LABEL => reason).increment(1);
    }
}

/// Scans one window and writes the records it yields.
///
/// Opens its own source and store connections, so any number of workers can run side by side.
/// A failure aborts the window; running it again is safe since every write is an upsert.
#[derive(Debug, Clone)]
pub struct WindowWorker<SC, DC> {
    window: TimeWindow,
    source_connector: SC,
    store_connector: DC,
    parser: LineParser,
    enricher: GeoEnricher,
    router: PartitionRouter,
    batch: BatchConfig,
}

impl<SC, DC> WindowWorker<SC, DC>
where
    SC: Connector,
    SC::Connection: LogSource + Sync,
    DC: Connector,
    DC::Connection: PartitionStore + Sync,
{
    pub fn new(
        window: TimeWindow,
        source_connector: SC,
        store_connector: DC,
        enricher: GeoEnricher,
        router: PartitionRouter,
        batch: BatchConfig,
    ) -> Self {
        Self {
            window,
            source_connector,
            store_connector,
            parser: LineParser::new(),
            enricher,
            router,
            batch,
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub async fn run(self) -> IngestResult<WindowReport> {
        let window = self.window;
        let mut report = WindowReport::new(window);
        let mut phase = WindowPhase::Planned;
        debug!(%window, %phase, "window planned");

        let source = self.source_connector.connect().await?;
        let store = self.store_connector.connect().await?;

        let prepared = self.router.ensure_partitions(&store, &window).await?;
        let mut ensured = EnsuredPartitions::new(prepared);
        let mut writer = BulkWriter::new(&store, self.batch.clone());

        enter_phase(&window, &mut phase, WindowPhase::Scanning);
        let mut entries = pin!(source.scan(window));
        while let Some(entry) = entries.next().await {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.kind() == ErrorKind::InvalidData => {
                    debug!(%window, error = %err, "skipping unreadable source document");
                    report.record_skip(INVALID_SOURCE_DOCUMENT_REASON);
                    continue;
                }
                Err(err) => return Err(err),
            };
            report.scanned += 1;
            counter!(XFER_ENTRIES_SCANNED_TOTAL).increment(1);

            let record = match self.build_record(&entry) {
                Ok(record) => record,
                Err(err) => {
                    debug!(
                        %window,
                        host = %entry.host,
                        offset = entry.offset,
                        reason = err.reason(),
                        error = %err,
                        "skipping log line"
                    );
                    report.record_skip(err.reason());
                    continue;
                }
            };

            let partition = self.router.route(&record);
            if !ensured.contains(&partition) {
                store.ensure_partition(&partition, &PARTITION_SCHEMA).await?;
                debug!(%window, %partition, "prepared partition outside the window");
                ensured.insert(partition.clone());
            }

            if phase == WindowPhase::Scanning {
                enter_phase(&window, &mut phase, WindowPhase::Batching);
            }
            writer
                .push(UpsertOperation {
                    partition,
                    document: record.to_document(),
                    id: record.id,
                })
                .await?;
        }

        enter_phase(&window, &mut phase, WindowPhase::Flushing);
        let stats = writer.finish().await?;
        report.written = stats.written;
        report.failed_writes = stats.failed;
        report.batches = stats.batches;
        report.retries = stats.retries;

        enter_phase(&window, &mut phase, WindowPhase::Done);
        info!(
            %window,
            scanned = report.scanned,
            skipped = report.total_skipped(),
            written = report.written,
            failed_writes = report.failed_writes,
            "window completed"
        );

        Ok(report)
    }

    /// Runs an entry through parsing, enrichment and identity.
    fn build_record(&self, entry: &RawLogEntry) -> Result<ParsedTransferRecord, ParseError> {
        let parsed = self.parser.parse(&entry.message)?;
        let geo = parsed
            .destination()
            .and_then(|destination| self.enricher.enrich(destination));

        Ok(ParsedTransferRecord::new(entry, parsed, geo, entry_id(entry)))
    }
}

fn enter_phase(window: &TimeWindow, phase: &mut WindowPhase, next: WindowPhase) {
    debug!(%window, from = %phase, to = %next, "window phase changed");
    *phase = next;
}
