use serde::Deserialize;

use crate::shared::{
    ElasticsearchConfig, GeoIpConfig, MetricsConfig, PipelineConfig, ValidationError,
};

/// Top-level configuration of the ingester binary.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestConfig {
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub geoip: GeoIpConfig,
    /// Prometheus exporter; disabled when absent.
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.elasticsearch.validate()?;
        self.pipeline.validate()
    }
}
