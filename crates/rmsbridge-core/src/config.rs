//! Configuration file and value resolution
//!
//! Settings come from a TOML file with one table per section:
//!
//! ```toml
//! [general]
//! debug = 1
//! delay = 0.1
//!
//! [redis]
//! hostname = "localhost"
//! port = 6379
//!
//! [fieldtrip]
//! hostname = "localhost"
//! port = 1972
//! timeout = 30
//!
//! [input]
//! frontal = 1
//! occipital = 4
//!
//! [processing]
//! window = 1.0
//!
//! [output]
//! prefix = "rms"
//! ```
//!
//! [`Patch`] layers the value store over the file: a numeric setting whose
//! file value is not a number is read as the name of a store key, and that
//! key's current value is used instead. This lets other processes steer
//! settings such as `general.delay` while the loop runs.

use crate::store::{StoreError, ValueStore};
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};
use tracing::{debug, info};

/// Errors that can occur while loading or resolving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Missing setting {section}.{key}")]
    Missing { section: String, key: String },

    #[error("Invalid setting {section}.{key}: {message}")]
    Invalid {
        section: String,
        key: String,
        message: String,
    },

    #[error("Setting {section}.{key} refers to store key {reference}, which has no numeric value")]
    Unresolved {
        section: String,
        key: String,
        reference: String,
    },

    #[error("Channel {name} has number {number}; channel numbers start at 1")]
    ChannelNumber { name: String, number: i64 },

    #[error("Channel {name} has number {number}, but the buffer has {available} channels")]
    ChannelOutOfRange {
        name: String,
        number: usize,
        available: usize,
    },

    #[error("Window of {seconds} s at {sample_rate} Hz rounds to zero samples")]
    ZeroWindow { seconds: f64, sample_rate: f64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Default config path: `<executable dir>/<executable stem>.toml`
pub fn default_path() -> PathBuf {
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("rmsbridge"));
    let stem = exe
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rmsbridge".to_string());
    exe.parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
        .join(format!("{stem}.toml"))
}

/// Parsed configuration file
///
/// Sections and their entries keep the order they were declared in.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    path: Option<PathBuf>,
    table: Table,
}

impl FileConfig {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse_with_path(&text, path)?;
        config.path = Some(path.to_path_buf());
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse config text that did not come from a file
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::parse_with_path(text, Path::new("<inline>"))
    }

    fn parse_with_path(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let table = text.parse::<Table>().map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self { path: None, table })
    }

    /// File this config was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw value of `section.key`
    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.table.get(section)?.as_table()?.get(key)
    }

    /// Entries of `section` in declaration order; empty if the section is absent
    pub fn items(&self, section: &str) -> Vec<(&str, &Value)> {
        self.table
            .get(section)
            .and_then(Value::as_table)
            .map(|t| t.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default()
    }
}

/// Strip one layer of matching surrounding quotes
fn trim_quotes(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

/// Config file combined with live overrides from the value store
pub struct Patch<V> {
    config: FileConfig,
    store: V,
}

impl<V: ValueStore> Patch<V> {
    pub fn new(config: FileConfig, store: V) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    pub fn store(&self) -> &V {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut V {
        &mut self.store
    }

    /// Resolve a numeric setting
    ///
    /// Numbers are used directly; any other string names a store key whose
    /// current value is parsed instead. Falls back to `default` when the
    /// setting or the referenced store value is absent.
    pub fn get_float(
        &mut self,
        section: &str,
        key: &str,
        default: Option<f64>,
    ) -> Result<f64, ConfigError> {
        let raw = match self.config.get(section, key) {
            Some(v) => v.clone(),
            None => return default.ok_or_else(|| missing(section, key)),
        };

        match raw {
            Value::Integer(i) => Ok(i as f64),
            Value::Float(f) => Ok(f),
            Value::Boolean(b) => Ok(if b { 1.0 } else { 0.0 }),
            Value::String(s) => {
                let text = trim_quotes(&s);
                if let Ok(v) = text.parse::<f64>() {
                    return Ok(v);
                }
                let live = self
                    .store
                    .get(text)?
                    .and_then(|v| trim_quotes(&v).parse::<f64>().ok());
                match (live, default) {
                    (Some(v), _) => {
                        debug!(section, key, reference = text, value = v, "Resolved live value");
                        Ok(v)
                    }
                    (None, Some(d)) => Ok(d),
                    (None, None) => Err(ConfigError::Unresolved {
                        section: section.to_string(),
                        key: key.to_string(),
                        reference: text.to_string(),
                    }),
                }
            }
            other => Err(ConfigError::Invalid {
                section: section.to_string(),
                key: key.to_string(),
                message: format!("expected a number, got {}", other.type_str()),
            }),
        }
    }

    /// Resolve an integer setting; fractional values are truncated toward zero
    pub fn get_int(
        &mut self,
        section: &str,
        key: &str,
        default: Option<i64>,
    ) -> Result<i64, ConfigError> {
        if let Some(Value::Integer(i)) = self.config.get(section, key) {
            return Ok(*i);
        }
        let v = self.get_float(section, key, default.map(|d| d as f64))?;
        if !v.is_finite() {
            return Err(ConfigError::Invalid {
                section: section.to_string(),
                key: key.to_string(),
                message: format!("expected an integer, got {v}"),
            });
        }
        Ok(v.trunc() as i64)
    }

    /// Resolve a text setting from the file
    pub fn get_string(
        &self,
        section: &str,
        key: &str,
        default: Option<&str>,
    ) -> Result<String, ConfigError> {
        match self.config.get(section, key) {
            Some(Value::String(s)) => Ok(trim_quotes(s).to_string()),
            Some(Value::Integer(i)) => Ok(i.to_string()),
            Some(Value::Float(f)) => Ok(f.to_string()),
            Some(other) => Err(ConfigError::Invalid {
                section: section.to_string(),
                key: key.to_string(),
                message: format!("expected text, got {}", other.type_str()),
            }),
            None => default
                .map(str::to_string)
                .ok_or_else(|| missing(section, key)),
        }
    }

    /// Names declared in `section`, in declaration order
    pub fn keys(&self, section: &str) -> Vec<String> {
        self.config
            .items(section)
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect()
    }

    /// Write a value to the store
    pub fn set_value(&mut self, key: &str, value: f64) -> Result<(), StoreError> {
        self.store.set(key, value)
    }
}

fn missing(section: &str, key: &str) -> ConfigError {
    ConfigError::Missing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::io::Write;

    const SAMPLE: &str = r#"
[general]
debug = 2
delay = "launch.control077"

[fieldtrip]
hostname = "'localhost'"
port = 1972
timeout = 30.5

[input]
zeta = 3
alpha = 1
mid = "2"

[processing]
window = 0.5
"#;

    fn patch() -> Patch<MemoryStore> {
        Patch::new(FileConfig::parse(SAMPLE).unwrap(), MemoryStore::new())
    }

    #[test]
    fn test_items_keep_declaration_order() {
        let config = FileConfig::parse(SAMPLE).unwrap();
        let names: Vec<&str> = config.items("input").into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(config.items("absent").is_empty());
    }

    #[test]
    fn test_numeric_values() {
        let mut p = patch();
        assert_eq!(p.get_float("processing", "window", None).unwrap(), 0.5);
        assert_eq!(p.get_float("fieldtrip", "timeout", None).unwrap(), 30.5);
        assert_eq!(p.get_int("fieldtrip", "port", None).unwrap(), 1972);
        assert_eq!(p.get_int("input", "mid", None).unwrap(), 2);
        assert_eq!(p.get_int("fieldtrip", "timeout", None).unwrap(), 30);
    }

    #[test]
    fn test_defaults_and_missing() {
        let mut p = patch();
        assert_eq!(p.get_float("general", "absent", Some(1.5)).unwrap(), 1.5);
        assert!(matches!(
            p.get_float("general", "absent", None),
            Err(ConfigError::Missing { .. })
        ));
        assert_eq!(
            p.get_string("output", "prefix", Some("rms")).unwrap(),
            "rms"
        );
    }

    #[test]
    fn test_live_reference_resolution() {
        let mut p = patch();
        // Unset reference without default
        assert!(matches!(
            p.get_float("general", "delay", None),
            Err(ConfigError::Unresolved { ref reference, .. }) if reference == "launch.control077"
        ));
        // Unset reference with default
        assert_eq!(p.get_float("general", "delay", Some(0.1)).unwrap(), 0.1);

        // Another process writes the referenced key
        p.store_mut().insert("launch.control077", 0.25);
        assert_eq!(p.get_float("general", "delay", Some(0.1)).unwrap(), 0.25);

        p.store_mut().insert("launch.control077", "0.75");
        assert_eq!(p.get_float("general", "delay", None).unwrap(), 0.75);
    }

    #[test]
    fn test_string_quotes_trimmed() {
        let p = patch();
        assert_eq!(
            p.get_string("fieldtrip", "hostname", None).unwrap(),
            "localhost"
        );
    }

    #[test]
    fn test_set_value_writes_store() {
        let mut p = patch();
        p.set_value("rms.alpha", 1.25).unwrap();
        assert_eq!(p.store().writes(), &[("rms.alpha".to_string(), 1.25)]);
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(matches!(
            FileConfig::parse("[general\ndelay = 1"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.path(), Some(file.path()));
        assert_eq!(config.get("fieldtrip", "port"), Some(&Value::Integer(1972)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }

    #[test]
    fn test_default_path_uses_toml_extension() {
        assert_eq!(
            default_path().extension().and_then(|e| e.to_str()),
            Some("toml")
        );
    }

    #[test]
    fn test_trim_quotes() {
        assert_eq!(trim_quotes("\"abc\""), "abc");
        assert_eq!(trim_quotes("'abc'"), "abc");
        assert_eq!(trim_quotes("'abc\""), "'abc\"");
        assert_eq!(trim_quotes("abc"), "abc");
    }
}
