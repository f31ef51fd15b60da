//! TOML configuration for the ledger sync runner.
//!
//! Example:
//!
//! ```toml
//! sync_check_interval_ms = 3000
//! sync_check_receive_status_timeout_ms = 5000
//! sync_request_timeout_ms = 5000
//! ledger_update_timeout_ms = 1000
//! sync_check_max_peers = 10
//! ban_duration_secs = 1800
//! ledger_status_update_max_peers_to_notify = 10
//! max_ledger_updates_rate = 50.0
//! ```
//!
//! Every field is optional and falls back to the [`SyncRelayConfig`] default.

use ledger_sync_node::SyncRelayConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("max_ledger_updates_rate must be a positive number, got {0}")]
    InvalidRate(f64),
}

/// On-disk form of [`SyncRelayConfig`], with durations in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncRelayConfigToml {
    #[serde(default = "default_sync_check_interval_ms")]
    pub sync_check_interval_ms: u64,

    #[serde(default = "default_sync_check_receive_status_timeout_ms")]
    pub sync_check_receive_status_timeout_ms: u64,

    #[serde(default = "default_sync_request_timeout_ms")]
    pub sync_request_timeout_ms: u64,

    #[serde(default = "default_ledger_update_timeout_ms")]
    pub ledger_update_timeout_ms: u64,

    /// Omit to ask every ledger-sync peer.
    #[serde(default)]
    pub sync_check_max_peers: Option<usize>,

    #[serde(default = "default_ban_duration_secs")]
    pub ban_duration_secs: u64,

    #[serde(default = "default_ledger_status_update_max_peers_to_notify")]
    pub ledger_status_update_max_peers_to_notify: usize,

    #[serde(default = "default_max_ledger_updates_rate")]
    pub max_ledger_updates_rate: f64,
}

fn default_sync_check_interval_ms() -> u64 {
    3000
}

fn default_sync_check_receive_status_timeout_ms() -> u64 {
    5000
}

fn default_sync_request_timeout_ms() -> u64 {
    5000
}

fn default_ledger_update_timeout_ms() -> u64 {
    1000
}

fn default_ban_duration_secs() -> u64 {
    30 * 60
}

fn default_ledger_status_update_max_peers_to_notify() -> usize {
    10
}

fn default_max_ledger_updates_rate() -> f64 {
    50.0
}

impl Default for SyncRelayConfigToml {
    fn default() -> Self {
        Self {
            sync_check_interval_ms: default_sync_check_interval_ms(),
            sync_check_receive_status_timeout_ms: default_sync_check_receive_status_timeout_ms(),
            sync_request_timeout_ms: default_sync_request_timeout_ms(),
            ledger_update_timeout_ms: default_ledger_update_timeout_ms(),
            sync_check_max_peers: None,
            ban_duration_secs: default_ban_duration_secs(),
            ledger_status_update_max_peers_to_notify:
                default_ledger_status_update_max_peers_to_notify(),
            max_ledger_updates_rate: default_max_ledger_updates_rate(),
        }
    }
}

impl SyncRelayConfigToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Validate and convert into the runtime configuration.
    pub fn into_config(self) -> Result<SyncRelayConfig, ConfigError> {
        let millis = |field: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Zero { field })
            } else {
                Ok(Duration::from_millis(value))
            }
        };

        if self.sync_check_max_peers == Some(0) {
            return Err(ConfigError::Zero {
                field: "sync_check_max_peers",
            });
        }
        if !(self.max_ledger_updates_rate.is_finite() && self.max_ledger_updates_rate > 0.0) {
            return Err(ConfigError::InvalidRate(self.max_ledger_updates_rate));
        }

        Ok(SyncRelayConfig {
            sync_check_interval: millis("sync_check_interval_ms", self.sync_check_interval_ms)?,
            sync_check_receive_status_timeout: millis(
                "sync_check_receive_status_timeout_ms",
                self.sync_check_receive_status_timeout_ms,
            )?,
            sync_request_timeout: millis("sync_request_timeout_ms", self.sync_request_timeout_ms)?,
            ledger_update_timeout: millis(
                "ledger_update_timeout_ms",
                self.ledger_update_timeout_ms,
            )?,
            sync_check_max_peers: self.sync_check_max_peers,
            ban_duration: Duration::from_secs(self.ban_duration_secs),
            ledger_status_update_max_peers_to_notify: self.ledger_status_update_max_peers_to_notify,
            max_ledger_updates_rate: self.max_ledger_updates_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_matches_defaults() {
        let config = SyncRelayConfigToml::from_toml_str("")
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config, SyncRelayConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = SyncRelayConfigToml::from_toml_str(
            r#"
            sync_request_timeout_ms = 250
            sync_check_max_peers = 4
            max_ledger_updates_rate = 5.5
            "#,
        )
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(config.sync_request_timeout, Duration::from_millis(250));
        assert_eq!(config.sync_check_max_peers, Some(4));
        assert_eq!(config.max_ledger_updates_rate, 5.5);
        assert_eq!(config.ledger_update_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = SyncRelayConfigToml::from_toml_str("ledger_update_timeout_ms = 0")
            .unwrap()
            .into_config()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Zero {
                field: "ledger_update_timeout_ms"
            }
        ));
    }

    #[test]
    fn test_bad_rate_rejected() {
        let err = SyncRelayConfigToml::from_toml_str("max_ledger_updates_rate = -1.0")
            .unwrap()
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRate(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SyncRelayConfigToml::from_toml_str("sync_timeout = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/nonexistent/ledger-sync.toml");
        let err = SyncRelayConfigToml::load(path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
