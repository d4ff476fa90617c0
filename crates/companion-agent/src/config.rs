//! Agent configuration

use anyhow::{Context, Result};
use companion_lib::sync::SyncConfig;
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompanionConfig {
    /// Device name used in log lines
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics/pois
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Search radius sent with every refresh request
    #[serde(default = "default_max_radius_km")]
    pub max_radius_km: f64,

    /// Maximum number of points of interest requested
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Reply timeout in seconds, 0 waits for the transport
    #[serde(default)]
    pub reply_timeout_secs: u64,

    /// Interval between explicit refreshes in seconds, 0 disables them
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "companion".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_radius_km() -> f64 {
    10.0
}

fn default_max_results() -> u32 {
    10
}

fn default_refresh_interval() -> u64 {
    300
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            max_radius_km: default_max_radius_km(),
            max_results: default_max_results(),
            reply_timeout_secs: 0,
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl CompanionConfig {
    /// Load configuration from `COMPANION_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("COMPANION").try_parsing(true))
            .build()
            .context("Failed to read configuration from environment")?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("Invalid companion configuration")
    }

    pub fn sync_config(&self) -> SyncConfig {
        let sync = SyncConfig::new(self.max_radius_km, self.max_results);
        match self.reply_timeout_secs {
            0 => sync,
            secs => sync.with_reply_timeout(Duration::from_secs(secs)),
        }
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = CompanionConfig::from_config(config::Config::default()).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.max_radius_km, 10.0);
        assert_eq!(config.max_results, 10);
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(300)));

        let sync = config.sync_config();
        assert_eq!(sync.max_results, 10);
        assert!(sync.reply_timeout.is_none());
    }

    #[test]
    fn test_overrides() {
        let source = config::Config::builder()
            .set_override("max_results", 3)
            .unwrap()
            .set_override("reply_timeout_secs", 15)
            .unwrap()
            .set_override("refresh_interval_secs", 0)
            .unwrap()
            .build()
            .unwrap();
        let config = CompanionConfig::from_config(source).unwrap();

        let sync = config.sync_config();
        assert_eq!(sync.max_results, 3);
        assert_eq!(sync.reply_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.refresh_interval(), None);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let source = config::Config::builder()
            .set_override("api_port", "not-a-port")
            .unwrap()
            .build()
            .unwrap();
        assert!(CompanionConfig::from_config(source).is_err());
    }
}
