//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.
//! We test observable outcomes, not implementation details of TOML parsing.

use enginemq_client::config::{ClientConfig, ConfigError};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[client]
id = "Worker-1"
max_workers = 4
connect_auto_start = true

[broker]
host = "broker.internal"
port = 16000
connect_timeout_ms = 2000
write_timeout_ms = 3000

[reconnect]
max_wait_ms = 1500

[publish]
timeout_ms = 800
pending_stale_secs = 60
pending_sweep_min_len = 10
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.client.id, "Worker-1", "id is stored as written");
    assert_eq!(config.client.max_workers, 4);
    assert!(config.client.connect_auto_start);
    assert_eq!(config.broker.host, "broker.internal");
    assert_eq!(config.broker.port, 16000);
    assert_eq!(config.connect_timeout(), Duration::from_secs(2));
    assert_eq!(config.write_timeout(), Duration::from_secs(3));
    assert_eq!(config.reconnect_max_wait(), Duration::from_millis(1500));
    assert_eq!(config.publish_timeout(), Duration::from_millis(800));
    assert_eq!(config.pending_stale_after(), Duration::from_secs(60));
    assert_eq!(config.publish.pending_sweep_min_len, 10);
}

#[test]
fn test_config_applies_defaults_for_missing_sections() {
    let temp_file = write_config(
        r#"
[client]
id = "worker"
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.host, "127.0.0.1");
    assert_eq!(config.broker.port, 16677);
    assert_eq!(config.reconnect_max_wait(), Duration::from_millis(750));
    assert_eq!(config.publish_timeout(), Duration::from_millis(500));
    assert_eq!(config.pending_stale_after(), Duration::from_secs(30));
    assert_eq!(config.publish.pending_sweep_min_len, 100);
    assert_eq!(config.client.max_workers, 1);
    assert!(!config.client.connect_auto_start);
}

#[test]
fn test_config_accepts_empty_file() {
    let temp_file = NamedTempFile::new().unwrap();

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config, ClientConfig::default());
}

#[test]
fn test_config_returns_error_for_invalid_toml_syntax() {
    let temp_file = write_config(
        r#"
[client
id = "worker"
"#,
    );

    let result = ClientConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::TomlParse(_)) => {}
        other => panic!("Expected TomlParse error for invalid TOML syntax, got {other:?}"),
    }
}

#[test]
fn test_config_returns_error_for_wrong_value_type() {
    let temp_file = write_config(
        r#"
[broker]
port = "not-a-number"
"#,
    );

    let result = ClientConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_returns_error_when_file_not_found() {
    let result = ClientConfig::load_from_file(Path::new("/nonexistent/enginemq.toml"));

    match result {
        Err(ConfigError::FileRead(_)) => {}
        other => panic!("Expected FileRead error for nonexistent file, got {other:?}"),
    }
}

#[test]
fn test_config_returns_error_for_invalid_client_id() {
    let temp_file = write_config(
        r#"
[client]
id = "worker one!"
"#,
    );

    let result = ClientConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::InvalidClientId(_))));
}

#[test]
fn test_config_accepts_client_ids_with_allowed_chars() {
    for id in ["worker", "worker-1", "worker_1", "svc.worker.01", ""] {
        let temp_file = write_config(&format!("[client]\nid = \"{id}\"\n"));

        let result = ClientConfig::load_from_file(temp_file.path());

        assert!(result.is_ok(), "client id {id:?} should be accepted");
    }
}

#[test]
fn test_config_rejects_out_of_range_values() {
    let cases = [
        "[client]\nmax_workers = 0\n",
        "[broker]\nhost = \"\"\n",
        "[broker]\nport = 0\n",
        "[broker]\nconnect_timeout_ms = 0\n",
        "[broker]\nwrite_timeout_ms = 0\n",
        "[publish]\ntimeout_ms = 0\n",
        "[publish]\npending_stale_secs = 0\n",
    ];

    for content in cases {
        let result = ClientConfig::from_toml_str(content);

        assert!(
            matches!(result, Err(ConfigError::InvalidConfig(_))),
            "expected InvalidConfig for {content:?}"
        );
    }
}

#[test]
fn test_auth_token_retrieved_from_environment() {
    std::env::set_var("TEST_ENGINEMQ_TOKEN", "s3cret");
    let temp_file = write_config(
        r#"
[client]
id = "worker"
auth_token_env = "TEST_ENGINEMQ_TOKEN"
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.resolved_auth_token().unwrap(), Some("s3cret".to_string()));
    std::env::remove_var("TEST_ENGINEMQ_TOKEN");
}

#[test]
fn test_auth_token_env_var_not_set_is_error() {
    let temp_file = write_config(
        r#"
[client]
auth_token_env = "TEST_ENGINEMQ_TOKEN_UNSET"
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    match config.resolved_auth_token() {
        Err(ConfigError::EnvVarNotFound(name)) => assert_eq!(name, "TEST_ENGINEMQ_TOKEN_UNSET"),
        other => panic!("Expected EnvVarNotFound, got {other:?}"),
    }
}

#[test]
fn test_no_auth_token_configured() {
    let config = ClientConfig::default();

    assert_eq!(config.resolved_auth_token().unwrap(), None);
}
