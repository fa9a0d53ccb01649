//! Registry configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::registry::{validate_path, DEFAULT_PATH, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Server side: where and how the registry is exposed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Whether this process serves a registry
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// HTTP path of the registry handler
    #[serde(default = "default_path")]
    pub path: String,

    /// Liveness timeout in seconds (0 = never expire)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Background eviction interval in seconds (0 = evict on query only)
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_listen_addr(),
            path: default_path(),
            timeout_secs: default_timeout_secs(),
            sweep_interval_secs: 0,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Client side: announcing this process to a registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Whether to run a heartbeat sender
    #[serde(default)]
    pub enabled: bool,

    /// Full URL of the registry endpoint
    #[serde(default)]
    pub registry_url: Option<String>,

    /// Address this process announces
    #[serde(default)]
    pub address: Option<String>,

    /// Heartbeat interval in seconds (0 = default)
    #[serde(default)]
    pub interval_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            registry_url: None,
            address: None,
            interval_secs: 0,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration problems found by [`Config::validate`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("registry path {0:?} must start with '/' and contain no ':', '*', '{{' or '}}'")]
    InvalidPath(String),

    #[error("heartbeat enabled but no registry_url configured")]
    MissingRegistryUrl,

    #[error("heartbeat enabled but no address configured")]
    MissingAddress,

    #[error("heartbeat request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,
}

// Defaults
fn default_true() -> bool { true }
fn default_listen_addr() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 9999)) }
fn default_path() -> String { DEFAULT_PATH.to_string() }
fn default_timeout_secs() -> u64 { DEFAULT_TIMEOUT.as_secs() }
fn default_request_timeout_secs() -> u64 { 10 }

impl Config {
    /// Load from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.enabled && validate_path(&self.registry.path).is_err() {
            return Err(ConfigError::InvalidPath(self.registry.path.clone()));
        }

        if self.heartbeat.enabled {
            if self.heartbeat.registry_url.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingRegistryUrl);
            }
            if self.heartbeat.address.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingAddress);
            }
            if self.heartbeat.request_timeout_secs == 0 {
                return Err(ConfigError::ZeroRequestTimeout);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_global_registry() {
        let config = Config::default();
        assert!(config.registry.enabled);
        assert_eq!(config.registry.path, DEFAULT_PATH);
        assert_eq!(config.registry.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.registry.sweep_interval(), None);
        assert!(!config.heartbeat.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_heartbeat_needs_url_and_address() {
        let mut config = Config::default();
        config.heartbeat.enabled = true;
        assert_eq!(config.validate(), Err(ConfigError::MissingRegistryUrl));

        config.heartbeat.registry_url = Some("http://registry:9999/_cleanwk_/registry".into());
        assert_eq!(config.validate(), Err(ConfigError::MissingAddress));

        config.heartbeat.address = Some("10.0.0.1:8000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relative_path_rejected() {
        let mut config = Config::default();
        config.registry.path = "registry".into();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPath("registry".into()))
        );
    }

    #[test]
    fn test_route_syntax_in_path_rejected() {
        let mut config = Config::default();
        for path in ["/reg*istry", "/svc/:name", "/svc/{id}"] {
            config.registry.path = path.into();
            assert_eq!(config.validate(), Err(ConfigError::InvalidPath(path.into())));
        }

        // A disabled registry never builds a route
        config.registry.enabled = false;
        assert!(config.validate().is_ok());
    }
}
