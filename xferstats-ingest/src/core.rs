use chrono::Utc;
use tracing::{debug, info, warn};
use xferstats::clients::elasticsearch::ElasticsearchConnector;
use xferstats::geo::GeoEnricher;
use xferstats::geo::maxmind::MaxMindGeoLookup;
use xferstats::geo::memory::MemoryGeoLookup;
use xferstats::pipeline::Pipeline;
use xferstats::planner::WindowPlanner;
use xferstats_config::shared::{
    ElasticsearchConfigWithoutSecrets, GeoIpConfig, IngestConfig, PipelineConfig,
};

use crate::args::RunRequest;
use crate::error::IngestServiceResult;

/// Runs one ingestion with the provided configuration.
///
/// The same cluster serves as source of the raw entries and as store of the statistics
/// records. Fails if any window failed, after every window has run.
pub async fn start_ingest_with_config(
    config: IngestConfig,
    request: RunRequest,
) -> IngestServiceResult<()> {
    info!("starting transfer log ingestion");

    log_config(&config);

    let enricher = init_enricher(&config.geoip)?;
    let connector = ElasticsearchConnector::new(config.elasticsearch);
    let pipeline = Pipeline::new(config.pipeline, connector.clone(), connector, enricher);

    let report = match request {
        RunRequest::Range { from, to, width } => {
            info!(%from, %to, period_minutes = width.num_minutes(), "ingesting range");
            pipeline.run_range(from, to, width).await?
        }
        RunRequest::LastHour => {
            let windows = WindowPlanner::last_hour(Utc::now());
            info!(windows = windows.len(), "ingesting the last hour");
            pipeline.run(windows).await?
        }
    };

    if let Some(err) = report.into_error() {
        return Err(err.into());
    }

    info!("transfer log ingestion finished");

    Ok(())
}

fn init_enricher(config: &GeoIpConfig) -> IngestServiceResult<GeoEnricher> {
    match &config.database_path {
        Some(path) => Ok(GeoEnricher::new(MaxMindGeoLookup::open(path)?)),
        None => {
            warn!("no geoip database configured, records will be stored without geo data");
            Ok(GeoEnricher::new(MemoryGeoLookup::new()))
        }
    }
}

fn log_config(config: &IngestConfig) {
    let elasticsearch: ElasticsearchConfigWithoutSecrets = config.elasticsearch.clone().into();
    debug!(?elasticsearch, "using elasticsearch config");
    log_pipeline_config(&config.pipeline);
    debug!(geoip_database = ?config.geoip.database_path, "using geoip config");
}

fn log_pipeline_config(config: &PipelineConfig) {
    debug!(
        max_workers = config.max_workers,
        partition_prefix = %config.partition_prefix,
        clamp_final_window = config.clamp_final_window,
        "using pipeline config"
    );
    debug!(
        max_size = config.batch.max_size,
        max_retries = config.batch.max_retries,
        initial_backoff_ms = config.batch.initial_backoff_ms,
        max_backoff_ms = config.batch.max_backoff_ms,
        "using batch config"
    );
}
