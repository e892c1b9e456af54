// Settings Model
// Application-wide configuration

use serde::{Deserialize, Serialize};

use super::{Connection, DestinationTemplate};

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_log_retention_days() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub connection: Connection,

    /// Timeout for blocking Restreamer calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Health monitor tick
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Failure threshold applied to newly created profiles
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Health check interval applied to new destinations
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,

    /// One of error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// User-defined encoding presets, added to the built-in catalog
    #[serde(default)]
    pub custom_templates: Vec<DestinationTemplate>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: Connection::default(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            failure_threshold: default_failure_threshold(),
            health_check_interval_secs: default_health_check_interval_secs(),
            log_retention_days: default_log_retention_days(),
            log_level: default_log_level(),
            custom_templates: Vec::new(),
        }
    }
}

impl Settings {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}
