use serde::{Deserialize, Serialize};

/// Prometheus exporter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    /// Port of the `/metrics` listener.
    pub port: u16,
}
