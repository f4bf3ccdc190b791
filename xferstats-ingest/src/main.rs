//! Transfer log ingester binary.
//!
//! Reads HTCondor transfer log lines from Elasticsearch for a time range, extracts their
//! statistics and writes them into daily statistics indices of the same cluster.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use xferstats_config::Environment;
use xferstats_config::shared::IngestConfig;
use xferstats_telemetry::metrics::init_metrics;
use xferstats_telemetry::tracing::init_tracing;

use crate::args::{Args, RunRequest};
use crate::config::load_ingest_config;
use crate::core::start_ingest_with_config;
use crate::error::{IngestServiceError, IngestServiceResult};

mod args;
mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

/// Parses the command line, loads configuration, initializes tracing and runs the ingestion
/// on a multi-threaded runtime.
fn run() -> IngestServiceResult<()> {
    let request = Args::parse().resolve()?;

    let ingest_config = load_ingest_config()?;

    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME")).map_err(IngestServiceError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(ingest_config, request))
}

async fn async_main(ingest_config: IngestConfig, request: RunRequest) -> IngestServiceResult<()> {
    // The exporter listener is spawned on the runtime, so it is set up here.
    if let Some(metrics_config) = &ingest_config.metrics {
        let environment = Environment::load()?;
        init_metrics(metrics_config.port, environment.as_str())
            .map_err(IngestServiceError::config)?;
    }

    if let Err(err) = start_ingest_with_config(ingest_config, request).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
