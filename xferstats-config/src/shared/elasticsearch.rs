use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Connection settings for the Elasticsearch cluster holding both the raw transfer logs and the
/// day-partitioned statistics indices.
///
/// This intentionally does not implement [`Serialize`] so the password cannot leak into
/// serialized output; log [`ElasticsearchConfigWithoutSecrets`] instead.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster, e.g. `https://search.example.org:9200`.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Index pattern scanned for raw transfer log entries.
    #[serde(default = "default_source_index")]
    pub source_index: String,
    /// How long the server keeps a scroll cursor alive between pages.
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
    /// Number of hits fetched per scroll page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ElasticsearchConfig {
    pub const DEFAULT_SOURCE_INDEX: &'static str = "transfer-logs-*";

    pub const DEFAULT_SCROLL_KEEP_ALIVE: &'static str = "3h";

    pub const DEFAULT_PAGE_SIZE: u32 = 1000;

    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

    /// Builds a configuration with defaults for everything but the URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            source_index: default_source_index(),
            scroll_keep_alive: default_scroll_keep_alive(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::invalid("elasticsearch.url", "must not be empty"));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(ValidationError::PasswordWithoutUsername);
        }

        if self.page_size == 0 {
            return Err(ValidationError::invalid(
                "elasticsearch.page_size",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// [`ElasticsearchConfig`] without the password, safe to log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElasticsearchConfigWithoutSecrets {
    pub url: String,
    pub username: Option<String>,
    pub source_index: String,
    pub scroll_keep_alive: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

impl From<ElasticsearchConfig> for ElasticsearchConfigWithoutSecrets {
    fn from(value: ElasticsearchConfig) -> Self {
        ElasticsearchConfigWithoutSecrets {
            url: value.url,
            username: value.username,
            source_index: value.source_index,
            scroll_keep_alive: value.scroll_keep_alive,
            page_size: value.page_size,
            request_timeout_secs: value.request_timeout_secs,
        }
    }
}

fn default_source_index() -> String {
    ElasticsearchConfig::DEFAULT_SOURCE_INDEX.to_string()
}

fn default_scroll_keep_alive() -> String {
    ElasticsearchConfig::DEFAULT_SCROLL_KEEP_ALIVE.to_string()
}

fn default_page_size() -> u32 {
    ElasticsearchConfig::DEFAULT_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    ElasticsearchConfig::DEFAULT_REQUEST_TIMEOUT_SECS
}
