//! Orchestration of a run: plan windows, fan them out to workers, collect the outcome.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tracing::{info, warn};
use xferstats_config::shared::PipelineConfig;

use crate::connector::Connector;
use crate::error::IngestResult;
use crate::geo::GeoEnricher;
use crate::metrics::{STATUS_LABEL, XFER_WINDOWS_COMPLETED_TOTAL, register_metrics};
use crate::partition::PartitionRouter;
use crate::planner::{FinalWindowPolicy, WindowPlanner};
use crate::source::LogSource;
use crate::store::PartitionStore;
use crate::types::TimeWindow;
use crate::workers::pool::{RunReport, WindowWorkerPool};
use crate::workers::window::WindowWorker;

/// Ingests transfer logs window by window.
///
/// Windows run concurrently on a pool of `max_workers` slots in no particular order. Each
/// window connects to the source and the store on its own.
#[derive(Debug, Clone)]
pub struct Pipeline<SC, DC> {
    config: PipelineConfig,
    source_connector: SC,
    store_connector: DC,
    enricher: GeoEnricher,
    router: PartitionRouter,
}

impl<SC, DC> Pipeline<SC, DC>
where
    SC: Connector + Clone + Send + Sync + 'static,
    SC::Connection: LogSource + Sync,
    DC: Connector + Clone + Send + Sync + 'static,
    DC::Connection: PartitionStore + Sync,
{
    pub fn new(
        config: PipelineConfig,
        source_connector: SC,
        store_connector: DC,
        enricher: GeoEnricher,
    ) -> Self {
        let router = PartitionRouter::new(config.partition_prefix.clone());

        Self {
            config,
            source_connector,
            store_connector,
            enricher,
            router,
        }
    }

    /// Returns a planner of `width` wide windows honoring the final window setting.
    pub fn planner(&self, width: Duration) -> IngestResult<WindowPlanner> {
        let policy = if self.config.clamp_final_window {
            FinalWindowPolicy::Clamp
        } else {
            FinalWindowPolicy::Overshoot
        };

        Ok(WindowPlanner::new(width)?.with_policy(policy))
    }

    /// Plans `[from, to)` in `width` wide windows and runs them.
    pub async fn run_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        width: Duration,
    ) -> IngestResult<RunReport> {
        let windows = self.planner(width)?.plan(from, to);

        self.run(windows).await
    }

    /// Runs `windows` and waits for all of them.
    ///
    /// Window failures are collected in the returned report; an error is returned only when
    /// the pool itself cannot run.
    pub async fn run(&self, windows: Vec<TimeWindow>) -> IngestResult<RunReport> {
        register_metrics();

        if windows.is_empty() {
            warn!("no windows to process");
            return Ok(RunReport::default());
        }

        info!(
            windows = windows.len(),
            first = %windows[0],
            max_workers = self.config.max_workers,
            "starting ingestion run"
        );

        let mut pool = WindowWorkerPool::new(self.config.max_workers as usize);
        for window in windows {
            let worker = WindowWorker::new(
                window,
                self.source_connector.clone(),
                self.store_connector.clone(),
                self.enricher.clone(),
                self.router.clone(),
                self.config.batch.clone(),
            );

            pool.spawn(window, worker.run()).await?;
        }

        let report = pool.wait_all().await;

        counter!(XFER_WINDOWS_COMPLETED_TOTAL, STATUS_LABEL => "succeeded")
            .increment(report.completed.len() as u64);
        counter!(XFER_WINDOWS_COMPLETED_TOTAL, STATUS_LABEL => "failed")
            .increment(report.failures.len() as u64);

        info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            scanned = report.scanned(),
            skipped = report.skipped(),
            written = report.written(),
            failed_writes = report.failed_writes(),
            "ingestion run finished"
        );

        Ok(report)
    }
}
