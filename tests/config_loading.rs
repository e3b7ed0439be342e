use std::io::Write;

use botflow_core::config::AppConfig;
use botflow_core::error::FlowError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_node_visits = 5
max_total_steps = 50
rest_timeout_secs = 10

[store]
path = "/tmp/botflow-test.db"

[sweeper]
interval_secs = 30

[webhook]
url = "https://hooks.example.com/deliver"
auth_token = "bf_test_token"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_node_visits, 5);
    assert_eq!(config.engine.max_total_steps, 50);
    assert_eq!(config.engine.rest_timeout_secs, 10);
    assert_eq!(config.store.path, "/tmp/botflow-test.db");
    assert_eq!(config.sweeper.interval_secs, 30);

    let webhook = config.webhook.expect("webhook section");
    assert_eq!(webhook.url, "https://hooks.example.com/deliver");
    assert_eq!(webhook.auth_token, Some("bf_test_token".to_string()));

    let limits = config.engine.limits();
    assert_eq!(limits.max_node_visits, 5);
    assert_eq!(limits.max_total_steps, 50);
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\nmax_node_visits = 7\n")
        .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_node_visits, 7);
    assert_eq!(config.engine.max_total_steps, 100);
    assert_eq!(config.engine.rest_timeout_secs, 30);
    assert_eq!(config.store.path, "botflow.db");
    assert!(config.webhook.is_none());
}

#[test]
fn test_missing_file_is_not_found() {
    let result = AppConfig::load(std::path::Path::new("/nonexistent/botflow.toml"));
    assert!(matches!(result, Err(FlowError::ConfigNotFound(_))));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine\nmax_node_visits = ")
        .expect("write toml");

    let result = AppConfig::load(tmp.path());
    assert!(matches!(result, Err(FlowError::Config(_))));
}
