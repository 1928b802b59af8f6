use std::env;
use std::fs::write;
use std::path::PathBuf;

use openreferee_server::config::DEFAULT_BIND;
use openreferee_server::load_config::{load_config, DATABASE_ENV, DEBUG_ENV};
use serial_test::serial;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn clear_env() {
    env::remove_var(DEBUG_ENV);
    env::remove_var(DATABASE_ENV);
}

/// A full static config loads as written when no overrides are set.
#[test]
#[serial]
fn test_load_config_reads_all_sections() {
    clear_env();
    let file = config_file(
        r#"
server:
  bind: 0.0.0.0:8080
storage:
  database: /var/lib/openreferee/events.sqlite3
watermark:
  template: /var/lib/openreferee/watermark.pdf
  label: CONFIDENTIAL
debug: true
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.server.bind, "0.0.0.0:8080");
    assert_eq!(config.storage.database, PathBuf::from("/var/lib/openreferee/events.sqlite3"));
    assert_eq!(config.watermark.template, PathBuf::from("/var/lib/openreferee/watermark.pdf"));
    assert_eq!(config.watermark.label, "CONFIDENTIAL");
    assert!(config.debug);
}

/// Optional sections fall back to defaults.
#[test]
#[serial]
fn test_load_config_applies_defaults() {
    clear_env();
    let file = config_file(
        r#"
storage:
  database: events.sqlite3
watermark:
  template: watermark.pdf
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.server.bind, DEFAULT_BIND);
    assert_eq!(config.watermark.label, "OpenReferee");
    assert!(!config.debug);
}

/// Environment variables override the file.
#[test]
#[serial]
fn test_load_config_env_overrides() {
    clear_env();
    let file = config_file(
        r#"
storage:
  database: events.sqlite3
watermark:
  template: watermark.pdf
debug: false
"#,
    );
    env::set_var(DEBUG_ENV, "yes");
    env::set_var(DATABASE_ENV, "/tmp/override.sqlite3");

    let config = load_config(file.path()).unwrap();
    clear_env();

    assert!(config.debug);
    assert_eq!(config.storage.database, PathBuf::from("/tmp/override.sqlite3"));
}

#[test]
#[serial]
fn test_load_config_errors_on_invalid_yaml() {
    clear_env();
    let file = config_file("storage: [this is: not valid");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
#[serial]
fn test_load_config_errors_on_missing_file() {
    clear_env();
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
