//! E2E tests for config files on disk
//!
//! Writes TOML files to a temp dir and resolves them into loop settings.

use rmsbridge::config::ConfigError;
use rmsbridge::poll::Settings;
use rmsbridge::{FileConfig, MemoryStore, Patch};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const FULL: &str = r#"
[general]
debug = 2
delay = 0.1

[fieldtrip]
hostname = "buffer.local"
port = 1973
timeout = 1.5

[input]
occipital = 4
frontal = 1
temporal = 3

[processing]
window = 1.0

[output]
prefix = "rms"
"#;

#[test]
fn test_settings_from_file() {
    let file = write_config(FULL);
    let config = FileConfig::load(file.path()).unwrap();
    assert_eq!(config.path(), Some(file.path()));

    let mut patch = Patch::new(config, MemoryStore::new());
    let settings = Settings::from_patch(&mut patch).unwrap();

    assert_eq!(settings.host, "buffer.local");
    assert_eq!(settings.port, 1973);
    assert_eq!(settings.timeout, Duration::from_millis(1500));
    assert_eq!(settings.window_seconds, 1.0);
    assert_eq!(settings.prefix, "rms");
}

#[test]
fn test_input_channels_keep_declaration_order() {
    let file = write_config(FULL);
    let mut patch = Patch::new(FileConfig::load(file.path()).unwrap(), MemoryStore::new());
    let settings = Settings::from_patch(&mut patch).unwrap();

    let names: Vec<&str> = settings.channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["occipital", "frontal", "temporal"]);
    let indices: Vec<usize> = settings.channels.iter().map(|c| c.source_index).collect();
    assert_eq!(indices, vec![3, 0, 2]);
}

#[test]
fn test_buffer_defaults_apply() {
    let text = FULL
        .replace("hostname = \"buffer.local\"\n", "")
        .replace("port = 1973\n", "");
    let file = write_config(&text);
    let mut patch = Patch::new(FileConfig::load(file.path()).unwrap(), MemoryStore::new());
    let settings = Settings::from_patch(&mut patch).unwrap();

    assert_eq!(settings.host, "localhost");
    assert_eq!(settings.port, rmsbridge::DEFAULT_BUFFER_PORT);
}

#[test]
fn test_window_read_through_store() {
    let text = FULL.replace("window = 1.0", "window = \"control.window\"");
    let file = write_config(&text);
    let mut store = MemoryStore::new();
    store.insert("control.window", 0.25);

    let mut patch = Patch::new(FileConfig::load(file.path()).unwrap(), store);
    let settings = Settings::from_patch(&mut patch).unwrap();
    assert_eq!(settings.window_seconds, 0.25);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    match FileConfig::load(&path) {
        Err(ConfigError::FileRead { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected FileRead, got {other:?}"),
    }
}

#[test]
fn test_malformed_file() {
    let file = write_config("[general\ndelay = 0.1\n");
    assert!(matches!(
        FileConfig::load(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_missing_required_setting() {
    let text = FULL.replace("prefix = \"rms\"\n", "");
    let file = write_config(&text);
    let mut patch = Patch::new(FileConfig::load(file.path()).unwrap(), MemoryStore::new());

    match Settings::from_patch(&mut patch) {
        Err(ConfigError::Missing { section, key }) => {
            assert_eq!(section, "output");
            assert_eq!(key, "prefix");
        }
        other => panic!("expected Missing, got {other:?}"),
    }
}

#[test]
fn test_channel_number_zero_rejected() {
    let text = FULL.replace("frontal = 1", "frontal = 0");
    let file = write_config(&text);
    let mut patch = Patch::new(FileConfig::load(file.path()).unwrap(), MemoryStore::new());

    assert!(matches!(
        Settings::from_patch(&mut patch),
        Err(ConfigError::ChannelNumber { number: 0, .. })
    ));
}

#[test]
fn test_port_out_of_range_rejected() {
    let text = FULL.replace("port = 1973", "port = 70000");
    let file = write_config(&text);
    let mut patch = Patch::new(FileConfig::load(file.path()).unwrap(), MemoryStore::new());

    assert!(matches!(
        Settings::from_patch(&mut patch),
        Err(ConfigError::Invalid { .. })
    ));
}
