use bemtrack_core::config::{CONFIG_ENV, DEFAULT_CONFIG_FILE};
use bemtrack_core::{BemtrackConfig, ConfigError};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn write_config(dir: &Path, name: &str, database: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(
        &path,
        format!("database_path = \"{database}\"\n\n[loans]\ndefault_duration_days = 14\n"),
    )
    .unwrap();
    path
}

#[test]
fn falls_back_to_defaults_without_any_file() {
    let dir = TempDir::new().unwrap();
    let config = BemtrackConfig::resolve_with(None, dir.path(), env_from(&[])).unwrap();
    assert_eq!(config, BemtrackConfig::default());
}

#[test]
fn local_file_is_picked_up_from_working_dir() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), DEFAULT_CONFIG_FILE, "local.sqlite3");

    let config = BemtrackConfig::resolve_with(None, dir.path(), env_from(&[])).unwrap();
    assert_eq!(config.database_path.to_str(), Some("local.sqlite3"));
    assert_eq!(config.loans.default_duration_days, 14);
    assert_eq!(config.reminders.window_days, 2);
}

#[test]
fn env_path_wins_over_local_file_and_explicit_wins_over_env() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), DEFAULT_CONFIG_FILE, "local.sqlite3");
    let from_env = write_config(dir.path(), "env.toml", "env.sqlite3");
    let explicit = write_config(dir.path(), "explicit.toml", "explicit.sqlite3");
    let env_path = from_env.to_string_lossy().into_owned();

    let config =
        BemtrackConfig::resolve_with(None, dir.path(), env_from(&[(CONFIG_ENV, &env_path)]))
            .unwrap();
    assert_eq!(config.database_path.to_str(), Some("env.sqlite3"));

    let config = BemtrackConfig::resolve_with(
        Some(&explicit),
        dir.path(),
        env_from(&[(CONFIG_ENV, &env_path)]),
    )
    .unwrap();
    assert_eq!(config.database_path.to_str(), Some("explicit.sqlite3"));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = BemtrackConfig::resolve_with(Some(&missing), dir.path(), env_from(&[]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Read { ref path, .. } if path == &missing));
}

#[test]
fn malformed_file_reports_parse_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "log_level = [").unwrap();

    let err = BemtrackConfig::resolve_with(None, dir.path(), env_from(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn env_overrides_apply_after_file() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), DEFAULT_CONFIG_FILE, "local.sqlite3");

    let config = BemtrackConfig::resolve_with(
        None,
        dir.path(),
        env_from(&[
            ("BEMTRACK_DATABASE", "/srv/bemtrack/db.sqlite3"),
            ("BEMTRACK_LOG_LEVEL", " debug "),
            ("BEMTRACK_LOG_DIR", "/var/log/bemtrack"),
        ]),
    )
    .unwrap();
    assert_eq!(config.database_path.to_str(), Some("/srv/bemtrack/db.sqlite3"));
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.log_dir.to_str(), Some("/var/log/bemtrack"));
    assert_eq!(config.loans.default_duration_days, 14);
}
