//! Logging setup for the Palaver engine.

use serde::{Deserialize, Serialize};

pub mod logging;

pub use logging::{init_logging, LogExt};

/// Configuration for the logging subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log filter used when `RUST_LOG` isn't set (e.g. "info,palaver_core=debug")
    pub log_filter: String,
    /// JSON output for log aggregation instead of pretty output
    pub enable_json_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "palaver".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
        }
    }
}

impl MonitoringConfig {
    /// Configuration taking its filter from the engine's log level
    pub fn for_engine(config: &palaver_core::EngineConfig) -> Self {
        Self {
            log_filter: config.log_level.clone(),
            ..Default::default()
        }
    }

    /// Switch to JSON output
    pub fn with_json(mut self, enabled: bool) -> Self {
        self.enable_json_logging = enabled;
        self
    }
}
