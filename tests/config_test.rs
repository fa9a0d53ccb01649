//! Config loading and defaults integration tests

use std::io::Write;
use std::time::Duration;

use cleanwk_registry::config::ConfigError;
use cleanwk_registry::{Config, DEFAULT_PATH, DEFAULT_TIMEOUT};

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();

    assert!(config.registry.enabled);
    assert_eq!(config.registry.path, DEFAULT_PATH);
    assert_eq!(config.registry.timeout(), DEFAULT_TIMEOUT);
    assert_eq!(config.registry.listen_addr.port(), 9999);
    assert!(!config.heartbeat.enabled);
}

#[test]
fn test_empty_file_uses_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"").unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.registry.path, DEFAULT_PATH);
    assert_eq!(config.heartbeat.request_timeout(), Duration::from_secs(10));
}

#[test]
fn test_config_with_all_fields() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[registry]
enabled = true
listen_addr = "127.0.0.1:7001"
path = "/registry"
timeout_secs = 0
sweep_interval_secs = 30

[heartbeat]
enabled = true
registry_url = "http://127.0.0.1:7001/registry"
address = "10.0.0.1:8000"
interval_secs = 15
request_timeout_secs = 3
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(
        config.registry.listen_addr,
        "127.0.0.1:7001".parse::<std::net::SocketAddr>().unwrap()
    );
    assert_eq!(config.registry.path, "/registry");
    assert_eq!(config.registry.timeout(), Duration::ZERO);
    assert_eq!(
        config.registry.sweep_interval(),
        Some(Duration::from_secs(30))
    );

    assert!(config.heartbeat.enabled);
    assert_eq!(
        config.heartbeat.registry_url.as_deref(),
        Some("http://127.0.0.1:7001/registry")
    );
    assert_eq!(config.heartbeat.address.as_deref(), Some("10.0.0.1:8000"));
    assert_eq!(config.heartbeat.interval(), Duration::from_secs(15));
    assert_eq!(config.heartbeat.request_timeout(), Duration::from_secs(3));
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_toml_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[registry\ntimeout_secs = ").unwrap();
    assert!(Config::load(file.path()).is_err());
}

#[test]
fn test_zero_request_timeout_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[heartbeat]
enabled = true
registry_url = "http://127.0.0.1:9999/_cleanwk_/registry"
address = "10.0.0.1:8000"
request_timeout_secs = 0
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.validate(), Err(ConfigError::ZeroRequestTimeout));
}
