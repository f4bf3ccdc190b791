use xferstats_config::load_config;
use xferstats_config::shared::IngestConfig;

use crate::error::{IngestServiceError, IngestServiceResult};

/// Loads the ingester configuration and validates it.
pub fn load_ingest_config() -> IngestServiceResult<IngestConfig> {
    let config = load_config::<IngestConfig>().map_err(IngestServiceError::config)?;
    config.validate().map_err(IngestServiceError::config)?;

    Ok(config)
}
