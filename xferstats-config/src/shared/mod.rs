//! Shared configuration types.

mod base;
mod batch;
mod elasticsearch;
mod geoip;
mod ingest;
mod metrics;
mod pipeline;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use elasticsearch::{ElasticsearchConfig, ElasticsearchConfigWithoutSecrets};
pub use geoip::GeoIpConfig;
pub use ingest::IngestConfig;
pub use metrics::MetricsConfig;
pub use pipeline::PipelineConfig;
