use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{ErrorKind, IngestError, IngestResult};
use crate::ingest_error;
use crate::types::TimeWindow;
use crate::workers::window::WindowReport;

/// Failure of one window.
#[derive(Debug, Clone)]
pub struct WindowFailure {
    /// `None` only if the task was cancelled before it could report its window.
    pub window: Option<TimeWindow>,
    pub error: IngestError,
}

/// Reports of every window of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<WindowReport>,
    pub failures: Vec<WindowFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn scanned(&self) -> u64 {
        self.completed.iter().map(|report| report.scanned).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.completed.iter().map(WindowReport::total_skipped).sum()
    }

    pub fn written(&self) -> u64 {
        self.completed.iter().map(|report| report.written).sum()
    }

    pub fn failed_writes(&self) -> u64 {
        self.completed.iter().map(|report| report.failed_writes).sum()
    }

    /// Aggregates the window failures into one error, if there are any.
    pub fn into_error(self) -> Option<IngestError> {
        if self.failures.is_empty() {
            return None;
        }

        let errors = self
            .failures
            .into_iter()
            .map(|failure| failure.error)
            .collect::<Vec<_>>();

        Some(errors.into())
    }
}

/// Runs window workers with at most `max_workers` of them active at once.
///
/// A worker that panics is reported as a failure of its own window and does not affect the
/// other windows.
#[derive(Debug)]
pub struct WindowWorkerPool {
    permits: Arc<Semaphore>,
    join_set: JoinSet<(TimeWindow, IngestResult<WindowReport>)>,
}

impl WindowWorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            join_set: JoinSet::new(),
        }
    }

    /// Waits for a free slot, then starts `future` for `window`.
    pub async fn spawn<F>(&mut self, window: TimeWindow, future: F) -> IngestResult<()>
    where
        F: Future<Output = IngestResult<WindowReport>> + Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await.map_err(|err| {
            ingest_error!(
                ErrorKind::InvalidState,
                "Could not acquire a window worker slot",
                err.to_string()
            )
        })?;

        self.join_set.spawn(async move {
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(ingest_error!(
                    ErrorKind::WindowWorkerPanic,
                    "Window worker panicked",
                    panic_message(panic.as_ref())
                )),
            };

            drop(permit);

            (window, result)
        });

        debug!(%window, "spawned window worker");

        Ok(())
    }

    /// Waits for every spawned worker and collects their outcomes.
    pub async fn wait_all(mut self) -> RunReport {
        let mut report = RunReport::default();

        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok((_, Ok(window_report))) => report.completed.push(window_report),
                Ok((window, Err(err))) => {
                    error!(%window, error = %err, "window failed");
                    report.failures.push(WindowFailure {
                        window: Some(window),
                        error: err,
                    });
                }
                Err(join_err) => {
                    error!(error = %join_err, "window worker task did not complete");
                    report.failures.push(WindowFailure {
                        window: None,
                        error: ingest_error!(
                            ErrorKind::WindowWorkerPanic,
                            "Window worker task did not complete",
                            join_err.to_string()
                        ),
                    });
                }
            }
        }

        report
            .completed
            .sort_by_key(|window_report| window_report.window.start);

        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn window(hour: u32) -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2020, 1, 2, hour, 0, 0).unwrap();
        TimeWindow::new(start, start + Duration::hours(1))
    }

    async fn exploding_worker() -> IngestResult<WindowReport> {
        panic!("boom")
    }

    #[tokio::test]
    async fn panics_only_fail_their_own_window() {
        let mut pool = WindowWorkerPool::new(2);

        pool.spawn(window(1), async { Ok(WindowReport::new(window(1))) })
            .await
            .unwrap();
        pool.spawn(window(2), exploding_worker()).await.unwrap();
        pool.spawn(window(3), async { Ok(WindowReport::new(window(3))) })
            .await
            .unwrap();

        let report = pool.wait_all().await;

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.completed[0].window, window(1));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].window, Some(window(2)));
        assert_eq!(report.failures[0].error.kind(), ErrorKind::WindowWorkerPanic);
        assert_eq!(report.failures[0].error.detail(), Some("boom"));
    }

    #[tokio::test]
    async fn errors_are_collected_per_window() {
        let mut pool = WindowWorkerPool::new(1);

        pool.spawn(window(1), async {
            Err::<WindowReport, _>(ingest_error!(ErrorKind::SourceQueryFailed, "Scroll failed"))
        })
        .await
        .unwrap();

        let report = pool.wait_all().await;

        assert!(!report.is_success());
        let err = report.into_error().unwrap();
        assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
    }
}
