//! Environment-driven configuration

use provlane_api::ServerConfig;
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;

const VARS: [&str; 9] = [
    "PORT",
    "PROVLANE_PORT",
    "PROVLANE_BACKLOG_CAPACITY",
    "PROVLANE_CLIENT_QUEUE_CAPACITY",
    "PROVLANE_CLIENT_IDLE_TIMEOUT_SECS",
    "PROVLANE_SESSION_RETENTION_SECS",
    "PROVLANE_GC_INTERVAL_SECS",
    "PROVLANE_OBSERVATION_CAP",
    "PROVLANE_PROOF_OF_WORK_DIR",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults_without_environment() {
    clear_env();
    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config, ServerConfig::default());
    assert_eq!(config.port, 3000);
    assert_eq!(config.backlog_capacity, 10_000);
    assert_eq!(config.observation_cap, 2000);
    assert_eq!(config.bind_address(), "0.0.0.0:3000");
}

#[test]
#[serial]
fn test_environment_overrides() {
    clear_env();
    std::env::set_var("PORT", "8080");
    std::env::set_var("PROVLANE_BACKLOG_CAPACITY", "50");
    std::env::set_var("PROVLANE_CLIENT_IDLE_TIMEOUT_SECS", "5");
    std::env::set_var("PROVLANE_PROOF_OF_WORK_DIR", "");

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.port, 8080);
    assert_eq!(config.backlog_capacity, 50);
    assert_eq!(config.client_idle_timeout, Duration::from_secs(5));
    assert_eq!(config.proof_of_work_dir, None);

    std::env::set_var("PROVLANE_PORT", "9090");
    std::env::set_var("PROVLANE_PROOF_OF_WORK_DIR", "artifacts");
    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.port, 9090);
    assert_eq!(config.proof_of_work_dir, Some(PathBuf::from("artifacts")));
    clear_env();
}

#[test]
#[serial]
fn test_invalid_value_is_an_error() {
    clear_env();
    std::env::set_var("PROVLANE_BACKLOG_CAPACITY", "lots");
    let err = ServerConfig::from_env().unwrap_err();
    assert!(err.to_string().contains("PROVLANE_BACKLOG_CAPACITY"));
    clear_env();
}

#[test]
fn test_builders() {
    let config = ServerConfig::new()
        .with_port(1)
        .with_client_queue_capacity(0)
        .with_session_retention(Duration::from_secs(1))
        .with_proof_of_work_dir(None);
    assert_eq!(config.port, 1);
    assert_eq!(config.client_queue_capacity, 1);
    assert_eq!(config.session_retention, Duration::from_secs(1));
    assert!(config.proof_of_work_dir.is_none());
}
