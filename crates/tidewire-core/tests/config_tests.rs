//! Tests for file-backed configuration sources.

use std::fs;
use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tidewire_core::{
    Config, ConfigError, ConfigSource, ConfigValue, IniConfigSource, JsonConfigSource, LogLevel,
};

fn write_temp(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_ini_source_typed_lookup() {
    let file = write_temp(
        ".ini",
        "# server settings\n[server]\nport = 9000\nworkers = 4\nratio = 0.75\nverbose = true\nname = edge-1\n",
    );
    let source = IniConfigSource::open(file.path()).unwrap();

    assert_eq!(source.path(), file.path());
    let config = Config::new();
    config.add_source(source);

    assert_eq!(config.get::<u16>("server", "port"), Some(9000));
    assert_eq!(config.get::<usize>("server", "workers"), Some(4));
    assert_eq!(config.get::<f64>("server", "ratio"), Some(0.75));
    assert_eq!(config.get::<bool>("server", "verbose"), Some(true));
    assert_eq!(config.get::<String>("server", "name"), Some("edge-1".into()));
    assert_eq!(config.get::<String>("server", "port"), Some("9000".into()));
    assert_eq!(config.get::<u16>("server", "name"), None);
}

#[test]
fn test_json_source_typed_lookup() {
    let file = write_temp(
        ".json",
        r#"{"server": {"port": 7001, "nodelay": false}, "logging": {"level": "debug"}}"#,
    );
    let config = Config::new();
    config.add_source(JsonConfigSource::open(file.path()).unwrap());

    assert_eq!(config.get::<u16>("server", "port"), Some(7001));
    assert_eq!(config.get::<bool>("server", "nodelay"), Some(false));
    assert_eq!(config.get::<LogLevel>("logging", "level"), Some(LogLevel::Debug));
}

#[test]
fn test_json_overrides_ini() {
    let ini = write_temp(".ini", "[server]\nport=9000\nbacklog=32\n");
    let json = write_temp(".json", r#"{"server": {"port": 9100}}"#);

    let config = Config::new();
    config.add_source(IniConfigSource::open(ini.path()).unwrap());
    config.add_source(JsonConfigSource::open(json.path()).unwrap());

    assert_eq!(config.get::<u16>("server", "port"), Some(9100));
    assert_eq!(config.get::<u32>("server", "backlog"), Some(32));
}

#[test]
fn test_reload_picks_up_changes() {
    let file = write_temp(".ini", "[pool]\nworkers=2\n");
    let source = Arc::new(IniConfigSource::open(file.path()).unwrap());

    let config = Config::new();
    config.add_shared_source(source.clone());
    assert_eq!(config.get::<usize>("pool", "workers"), Some(2));

    fs::write(file.path(), "[pool]\nworkers=6\n").unwrap();
    config.reload_all().unwrap();
    assert_eq!(config.get::<usize>("pool", "workers"), Some(6));
}

#[test]
fn test_failed_reload_keeps_previous_values() {
    let file = write_temp(".json", r#"{"pool": {"workers": 3}}"#);
    let source = JsonConfigSource::open(file.path()).unwrap();

    fs::write(file.path(), "not json").unwrap();
    assert!(matches!(source.reload(), Err(ConfigError::Parse { .. })));
    assert_eq!(
        source.find("pool", "workers"),
        Some(ConfigValue::Integer(3))
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.ini");

    let err = IniConfigSource::open(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.ini"));
}

#[test]
fn test_json_array_root_is_invalid_structure() {
    let file = write_temp(".json", "[1, 2, 3]");
    let err = JsonConfigSource::open(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidStructure { .. }));
}

#[test]
fn test_reload_all_reports_first_error_but_reloads_rest() {
    let good = write_temp(".ini", "[a]\nx=1\n");
    let bad = write_temp(".json", r#"{"a": {"y": 1}}"#);

    let good_source = Arc::new(IniConfigSource::open(good.path()).unwrap());
    let bad_source = Arc::new(JsonConfigSource::open(bad.path()).unwrap());
    let config = Config::new();
    config.add_shared_source(bad_source);
    config.add_shared_source(good_source);

    fs::write(bad.path(), "{").unwrap();
    fs::write(good.path(), "[a]\nx=2\n").unwrap();

    assert!(config.reload_all().is_err());
    assert_eq!(config.get::<i32>("a", "x"), Some(2));
    assert_eq!(config.get::<i32>("a", "y"), Some(1));
}

#[test]
fn test_ini_save_round_trip() {
    let file = write_temp(".ini", "[server]\nport = 9000\nname = edge\n");
    let source = IniConfigSource::open(file.path()).unwrap();

    source.set("server", "port", 9100_i64);
    source.set("server", "ratio", 2.0);
    source.set("pool", "verbose", true);
    source.save().unwrap();

    let reopened = IniConfigSource::open(file.path()).unwrap();
    assert_eq!(reopened.find("server", "port"), Some(ConfigValue::Integer(9100)));
    assert_eq!(reopened.find("server", "name"), Some(ConfigValue::String("edge".into())));
    assert_eq!(reopened.find("server", "ratio"), Some(ConfigValue::Float(2.0)));
    assert_eq!(reopened.find("pool", "verbose"), Some(ConfigValue::Bool(true)));
}

#[test]
fn test_ini_unsaved_change_is_discarded_by_reload() {
    let file = write_temp(".ini", "[pool]\nworkers = 2\n");
    let source = IniConfigSource::open(file.path()).unwrap();

    source.set("pool", "workers", 8_i64);
    assert_eq!(source.find("pool", "workers"), Some(ConfigValue::Integer(8)));
    source.reload().unwrap();
    assert_eq!(source.find("pool", "workers"), Some(ConfigValue::Integer(2)));
}

#[test]
fn test_ini_save_section_and_key() {
    let file = write_temp(".ini", "[server]\nport = 9000\nbacklog = 32\n[pool]\nworkers = 4\n");
    let source = IniConfigSource::open(file.path()).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let section_path = dir.path().join("server.ini");
    source.save_section(&section_path, "server").unwrap();
    let section = IniConfigSource::open(&section_path).unwrap();
    assert_eq!(section.find("server", "backlog"), Some(ConfigValue::Integer(32)));
    assert_eq!(section.find("pool", "workers"), None);

    let key_path = dir.path().join("port.ini");
    source.save_key(&key_path, "server", "port").unwrap();
    let key = IniConfigSource::open(&key_path).unwrap();
    assert_eq!(key.find("server", "port"), Some(ConfigValue::Integer(9000)));
    assert_eq!(key.find("server", "backlog"), None);

    assert!(matches!(
        source.save_section(dir.path().join("x.ini"), "absent"),
        Err(ConfigError::Missing { .. })
    ));
    assert!(matches!(
        source.save_key(dir.path().join("y.ini"), "server", "absent"),
        Err(ConfigError::Missing { .. })
    ));
    assert!(!dir.path().join("x.ini").exists());
}

#[test]
fn test_ini_save_to_unwritable_path_is_io_error() {
    let file = write_temp(".ini", "[a]\nx = 1\n");
    let source = IniConfigSource::open(file.path()).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = source.save_to(dir.path().join("no/such/dir.ini")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
