use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, ValidationError};

/// Settings of the windowed ingestion pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Number of windows processed concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: u16,
    /// Prefix of the day partitions, which are named `<prefix>-YYYY.MM.DD`.
    #[serde(default = "default_partition_prefix")]
    pub partition_prefix: String,
    /// Ends the last planned window at the requested end instead of one full width after its
    /// start.
    #[serde(default)]
    pub clamp_final_window: bool,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl PipelineConfig {
    pub const DEFAULT_MAX_WORKERS: u16 = 5;

    pub const DEFAULT_PARTITION_PREFIX: &'static str = "htcondor-xfer-stats";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_workers == 0 {
            return Err(ValidationError::invalid(
                "pipeline.max_workers",
                "must be greater than 0",
            ));
        }

        if self.partition_prefix.is_empty()
            || self
                .partition_prefix
                .chars()
                .any(|c| c.is_ascii_uppercase() || c.is_whitespace() || "\\/*?\"<>|,#".contains(c))
        {
            return Err(ValidationError::invalid(
                "pipeline.partition_prefix",
                "must be a non-empty lowercase index name prefix",
            ));
        }

        self.batch.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            partition_prefix: default_partition_prefix(),
            clamp_final_window: false,
            batch: BatchConfig::default(),
        }
    }
}

fn default_max_workers() -> u16 {
    PipelineConfig::DEFAULT_MAX_WORKERS
}

fn default_partition_prefix() -> String {
    PipelineConfig::DEFAULT_PARTITION_PREFIX.to_string()
}
