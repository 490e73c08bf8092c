use std::env;
use std::fs;

use keyforge::config::KeyforgeConfig;
use keyforge::errors::KeyforgeError;
use serial_test::serial;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "KEYFORGE_MAX_ATTEMPTS",
    "KEYFORGE_BACKOFF_BASE_MS",
    "KEYFORGE_SESSION_FAILURE_RATE",
    "KEYFORGE_SEED",
    "KEYFORGE_DEFAULT_AMOUNT",
    "KEYFORGE_FAST",
    "KEYFORGE_REPORT_DIR",
    "KEYFORGE_REPORT_PREFIX",
    "KEYFORGE_REPORT_FORMAT",
    "KEYFORGE_LOGGING_ENABLED",
    "KEYFORGE_LOG_LEVEL",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("keyforge.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
#[serial]
fn file_values_override_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[client]
max_attempts = 5
session_failure_rate = 0.25

[report]
file_prefix = "audit"
"#,
    );

    let config = KeyforgeConfig::load_from_file(&path).unwrap();
    assert_eq!(config.client.max_attempts, 5);
    assert_eq!(config.client.session_failure_rate, 0.25);
    assert_eq!(config.report.file_prefix, "audit");
    // untouched values keep their defaults
    assert_eq!(config.client.backoff_base_ms, 500);
    assert_eq!(config.pipeline.default_amount, 10);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn env_overrides_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[client]\nmax_attempts = 5\n");

    env::set_var("KEYFORGE_MAX_ATTEMPTS", "7");
    env::set_var("KEYFORGE_REPORT_FORMAT", "json");
    env::set_var("KEYFORGE_SEED", "1234");
    let config = KeyforgeConfig::load_from_file(&path).unwrap();
    clear_env();

    assert_eq!(config.client.max_attempts, 7);
    assert_eq!(config.report.format, "json");
    assert_eq!(config.client.seed, Some(1234));
}

#[test]
#[serial]
fn fast_mode_from_env_zeroes_delays() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[pipeline]\nkey_pause_ms = 900\n");

    env::set_var("KEYFORGE_FAST", "true");
    let config = KeyforgeConfig::load_from_file(&path).unwrap();
    clear_env();

    assert!(config.pipeline.fast);
    assert_eq!(config.pipeline.key_pause_ms, 0);
    assert_eq!(config.client.session_latency_max_ms, 0);
}

#[test]
#[serial]
fn unparseable_env_values_are_ignored() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    env::set_var("KEYFORGE_MAX_ATTEMPTS", "lots");
    let config = KeyforgeConfig::load_from_file(&path).unwrap();
    clear_env();

    assert_eq!(config.client.max_attempts, 3);
}

#[test]
#[serial]
fn invalid_values_fail_validation() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[logging]\nlevel = \"loud\"\n");

    let config = KeyforgeConfig::load_from_file(&path).unwrap();
    assert!(matches!(
        config.validate(),
        Err(KeyforgeError::ConfigError(msg)) if msg.contains("logging.level")
    ));
}

#[test]
#[serial]
fn missing_file_is_an_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let result = KeyforgeConfig::load_from_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(KeyforgeError::ConfigError(_))));
}
