use serial_test::serial;
use snap_upload::load_config::{load_config, API_KEY_ENV};
use snap_upload_core::config::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};
use std::env;
use std::fs::write;
use tempfile::NamedTempFile;

/// A static config plus the env credential produces a merged UploadConfig.
#[test]
#[serial]
fn test_load_config_success_injects_env_credential() {
    let config_yaml = r#"
upload:
  direct_url: false
  endpoint: "http://localhost:8080/3/image"
  timeout_secs: 15
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    env::set_var(API_KEY_ENV, "top-secret-test-key");

    let config = load_config(Some(config_file.path())).expect("Config should load");

    assert_eq!(config.api_key, "top-secret-test-key");
    assert!(!config.direct_url);
    assert_eq!(config.endpoint, "http://localhost:8080/3/image");
    assert_eq!(config.timeout_secs, 15);
    assert!(!format!("{config:?}").contains("top-secret-test-key"));
}

#[test]
#[serial]
fn test_load_config_without_file_uses_defaults() {
    env::set_var(API_KEY_ENV, "key");

    let config = load_config(None).expect("Config should load");

    assert!(config.direct_url);
    assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
}

#[test]
#[serial]
fn test_load_config_partial_file_keeps_other_defaults() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "upload:\n  direct_url: false\n").unwrap();
    env::set_var(API_KEY_ENV, "key");

    let config = load_config(Some(config_file.path())).expect("Config should load");

    assert!(!config.direct_url);
    assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
}

/// Missing credential makes the loader fail and name the variable.
#[test]
#[serial]
fn test_load_config_errors_on_missing_env() {
    env::remove_var(API_KEY_ENV);

    let err = load_config(None).unwrap_err();
    let msg = err.to_string();

    assert!(msg.contains(API_KEY_ENV), "Must error for missing env var, got: {msg}");
}

#[test]
#[serial]
fn test_load_config_errors_for_invalid_file() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), b"upload: [:::").unwrap();
    env::set_var(API_KEY_ENV, "present");

    let err = load_config(Some(config_file.path())).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
#[serial]
fn test_load_config_errors_for_zero_timeout() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "upload:\n  timeout_secs: 0\n").unwrap();
    env::set_var(API_KEY_ENV, "present");

    let err = load_config(Some(config_file.path())).unwrap_err();
    assert!(err.to_string().contains("timeout_secs"));
}

#[test]
#[serial]
fn test_load_config_errors_for_missing_file() {
    env::set_var(API_KEY_ENV, "present");
    let err = load_config(Some(std::path::Path::new("/no/such/config.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
