//! Engine version metadata embedded in result files and `bitflux version`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_date: Option<String>,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("BITFLUX_COMMIT").map(|s| s.to_string()),
        build_date: option_env!("BITFLUX_BUILD_DATE").map(|s| s.to_string()),
    }
}
