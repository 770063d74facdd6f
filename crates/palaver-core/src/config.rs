//! Configuration for the Palaver engine
//!
//! Values come from defaults, then an optional YAML document, then `PALAVER_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::CoreError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the asset server used to build asset locators
    #[serde(default = "default_asset_server_url")]
    pub asset_server_url: String,

    /// Bearer token sent with asset requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_server_token: Option<String>,

    /// Timeout applied to asset fetches and outgoing service calls
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Maximum number of steps a session may take before it is failed
    #[serde(default = "default_max_steps_per_session")]
    pub max_steps_per_session: usize,

    /// Number of levels indexed in location hierarchies
    #[serde(default = "default_max_location_levels")]
    pub max_location_levels: usize,

    /// User agent sent with webhook calls
    #[serde(default = "default_webhook_user_agent")]
    pub webhook_user_agent: String,

    /// Response bodies larger than this are truncated in webhook results
    #[serde(default = "default_webhook_max_body_bytes")]
    pub webhook_max_body_bytes: usize,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_asset_server_url() -> String {
    "http://localhost:8000/assets".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_max_steps_per_session() -> usize {
    100
}

fn default_max_location_levels() -> usize {
    4
}

fn default_webhook_user_agent() -> String {
    "palaver".to_string()
}

fn default_webhook_max_body_bytes() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_server_url: default_asset_server_url(),
            asset_server_token: None,
            http_timeout_ms: default_http_timeout_ms(),
            max_steps_per_session: default_max_steps_per_session(),
            max_location_levels: default_max_location_levels(),
            webhook_user_agent: default_webhook_user_agent(),
            webhook_max_body_bytes: default_webhook_max_body_bytes(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults overridden by environment variables
    pub fn load() -> Result<Self, CoreError> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document, then apply environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        let mut config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::ConfigurationError(format!("invalid YAML: {}", e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Timeout as a [`Duration`]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Check required fields and limits
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.asset_server_url.is_empty() {
            return Err(CoreError::ConfigurationError(
                "Asset server URL is required".to_string(),
            ));
        }
        if url::Url::parse(&self.asset_server_url).is_err() {
            return Err(CoreError::ConfigurationError(format!(
                "Asset server URL is not a valid URL: {}",
                self.asset_server_url
            )));
        }
        if self.max_steps_per_session == 0 {
            return Err(CoreError::ConfigurationError(
                "max_steps_per_session must be greater than zero".to_string(),
            ));
        }
        if self.max_location_levels == 0 {
            return Err(CoreError::ConfigurationError(
                "max_location_levels must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = env::var("PALAVER_ASSET_SERVER_URL") {
            self.asset_server_url = url;
        }

        if let Ok(token) = env::var("PALAVER_ASSET_SERVER_TOKEN") {
            self.asset_server_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Ok(timeout) = env::var("PALAVER_HTTP_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.http_timeout_ms = ms,
                Err(_) => warn!("Invalid PALAVER_HTTP_TIMEOUT_MS value: {}", timeout),
            }
        }

        if let Ok(max_steps) = env::var("PALAVER_MAX_STEPS_PER_SESSION") {
            match max_steps.parse::<usize>() {
                Ok(steps) => self.max_steps_per_session = steps,
                Err(_) => warn!("Invalid PALAVER_MAX_STEPS_PER_SESSION value: {}", max_steps),
            }
        }

        if let Ok(levels) = env::var("PALAVER_MAX_LOCATION_LEVELS") {
            match levels.parse::<usize>() {
                Ok(l) => self.max_location_levels = l,
                Err(_) => warn!("Invalid PALAVER_MAX_LOCATION_LEVELS value: {}", levels),
            }
        }

        if let Ok(user_agent) = env::var("PALAVER_WEBHOOK_USER_AGENT") {
            self.webhook_user_agent = user_agent;
        }

        if let Ok(max_body) = env::var("PALAVER_WEBHOOK_MAX_BODY_BYTES") {
            match max_body.parse::<usize>() {
                Ok(bytes) => self.webhook_max_body_bytes = bytes,
                Err(_) => warn!("Invalid PALAVER_WEBHOOK_MAX_BODY_BYTES value: {}", max_body),
            }
        }

        if let Ok(log_level) = env::var("PALAVER_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_location_levels, 4);
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_yaml_fills_missing_fields_with_defaults() {
        let config = EngineConfig::from_yaml_str(
            "asset_server_url: http://assets.example.com/v1\nmax_steps_per_session: 25\n",
        )
        .unwrap();

        assert_eq!(config.asset_server_url, "http://assets.example.com/v1");
        assert_eq!(config.max_steps_per_session, 25);
        assert_eq!(config.webhook_user_agent, "palaver");
        assert_eq!(config.asset_server_token, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig {
            asset_server_url: "not a url".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigurationError(_))
        ));

        let config = EngineConfig {
            max_steps_per_session: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = EngineConfig::from_yaml_str("max_steps_per_session: [");
        assert!(matches!(result, Err(CoreError::ConfigurationError(_))));
    }
}
