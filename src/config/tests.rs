use super::*;
use serial_test::serial;
use std::env;

/// These tests mutate global environment variables; `#[serial]` keeps them
/// from interleaving with each other across the test binary's threads.
fn cleanup_test_env() {
    env::remove_var("API_KEY");
    env::remove_var("API_HOST");
    env::remove_var("ALLOWED_ORIGINS");
    env::remove_var("TRANSPORT_PORT_PRIMARY");
    env::remove_var("TRANSPORT_PORT_RPC");
    env::remove_var("ADMISSION_QUEUE_SIZE");
    env::remove_var("AGENT_INBOX_SIZE");
    env::remove_var("GATEWAY_SEND_BUFFER");
    env::remove_var("TASK_TIMEOUT_DEFAULT");
    env::remove_var("TIMEOUT_SWEEP_INTERVAL");
    env::remove_var("AGENT_INACTIVE_THRESHOLD");
    env::remove_var("AGENT_DEAD_THRESHOLD");
    env::remove_var("LOG_LEVEL");
}

#[test]
#[serial]
fn missing_api_key_is_rejected() {
    cleanup_test_env();

    let result = Config::load();
    assert!(result.is_err());

    cleanup_test_env();
}

#[test]
#[serial]
fn short_api_key_is_rejected() {
    cleanup_test_env();
    env::set_var("API_KEY", "too-short");

    let result = Config::load();
    assert!(result.is_err());

    cleanup_test_env();
}

#[test]
#[serial]
fn valid_api_key_loads_defaults() {
    cleanup_test_env();
    env::set_var(
        "API_KEY",
        "secure-api-key-1234567890123456789012345678901234567890",
    );

    let config = Config::load().unwrap();
    assert_eq!(config.transport.host, "127.0.0.1");
    assert_eq!(config.transport.port_primary, DEFAULT_TRANSPORT_PORT_PRIMARY);
    assert_eq!(config.transport.port_rpc, DEFAULT_TRANSPORT_PORT_RPC);
    assert_eq!(config.coordinator.admission_queue_size, DEFAULT_ADMISSION_QUEUE_SIZE);
    assert_eq!(config.agent_manager.agent_inbox_size, DEFAULT_AGENT_INBOX_SIZE);
    assert_eq!(config.api.gateway_send_buffer, DEFAULT_GATEWAY_SEND_BUFFER);
    assert_eq!(
        config.api.allowed_origins,
        vec![
            "http://localhost:3000".to_string(),
            "http://127.0.0.1:3000".to_string()
        ]
    );

    cleanup_test_env();
}

#[test]
#[serial]
fn custom_allowed_origins_are_parsed() {
    cleanup_test_env();
    env::set_var(
        "API_KEY",
        "secure-api-key-1234567890123456789012345678901234567890",
    );
    env::set_var("ALLOWED_ORIGINS", "https://example.com,https://app.example.com");

    let config = Config::load().unwrap();
    assert_eq!(
        config.api.allowed_origins,
        vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string()
        ]
    );

    cleanup_test_env();
}

#[test]
#[serial]
fn overridden_thresholds_are_honored() {
    cleanup_test_env();
    env::set_var(
        "API_KEY",
        "secure-api-key-1234567890123456789012345678901234567890",
    );
    env::set_var("ADMISSION_QUEUE_SIZE", "42");
    env::set_var("AGENT_INACTIVE_THRESHOLD", "15");

    let config = Config::load().unwrap();
    assert_eq!(config.coordinator.admission_queue_size, 42);
    assert_eq!(
        config.agent_manager.agent_inactive_threshold,
        Duration::from_secs(15)
    );

    cleanup_test_env();
}

#[test]
#[serial]
fn default_log_level_is_info() {
    cleanup_test_env();
    env::set_var(
        "API_KEY",
        "secure-api-key-1234567890123456789012345678901234567890",
    );

    let config = Config::load().unwrap();
    assert_eq!(config.log_level, "info");

    cleanup_test_env();
}

#[test]
#[serial]
fn invalid_log_level_is_rejected() {
    cleanup_test_env();
    env::set_var(
        "API_KEY",
        "secure-api-key-1234567890123456789012345678901234567890",
    );
    env::set_var("LOG_LEVEL", "verbose");

    let result = Config::load();
    assert!(result.is_err());

    cleanup_test_env();
}

#[test]
#[serial]
fn malformed_numeric_override_is_rejected() {
    cleanup_test_env();
    env::set_var(
        "API_KEY",
        "secure-api-key-1234567890123456789012345678901234567890",
    );
    env::set_var("ADMISSION_QUEUE_SIZE", "not-a-number");

    let result = Config::load();
    assert!(result.is_err());

    cleanup_test_env();
}
