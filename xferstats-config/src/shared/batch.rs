use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Batching and retry settings for bulk writes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Number of pending upserts that triggers a flush.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
    /// Retries of a failed flush before its remaining operations are given up on.
    #[serde(default = "default_batch_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    #[serde(default = "default_batch_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound on the delay between retries.
    #[serde(default = "default_batch_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl BatchConfig {
    pub const DEFAULT_MAX_SIZE: usize = 100;

    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::invalid(
                "pipeline.batch.max_size",
                "must be greater than 0",
            ));
        }

        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ValidationError::invalid(
                "pipeline.batch.initial_backoff_ms",
                "must not exceed `pipeline.batch.max_backoff_ms`",
            ));
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
            max_retries: default_batch_max_retries(),
            initial_backoff_ms: default_batch_initial_backoff_ms(),
            max_backoff_ms: default_batch_max_backoff_ms(),
        }
    }
}

fn default_batch_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}

fn default_batch_max_retries() -> u32 {
    BatchConfig::DEFAULT_MAX_RETRIES
}

fn default_batch_initial_backoff_ms() -> u64 {
    BatchConfig::DEFAULT_INITIAL_BACKOFF_MS
}

fn default_batch_max_backoff_ms() -> u64 {
    BatchConfig::DEFAULT_MAX_BACKOFF_MS
}
