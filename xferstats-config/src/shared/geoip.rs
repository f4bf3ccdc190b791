use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Location of the geographic database used to annotate destination addresses.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GeoIpConfig {
    /// Path to a MaxMind GeoIP2/GeoLite2 City database.
    ///
    /// When unset, records are stored without geographic annotations.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}
