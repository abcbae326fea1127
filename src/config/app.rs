use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error returned when the application config cannot be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A single value from the open `app_config` bag.
///
/// Deserialized untagged so that plain YAML/JSON scalars, lists and maps map
/// onto the obvious variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Outcome of looking a key up in the `app_config` bag.
///
/// The typed accessors on [`AppConfig`] collapse `Missing` and a type
/// mismatch into a documented default; callers that need to tell the two
/// apart use [`AppConfig::lookup`] directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigLookup<'a> {
    Found(&'a ConfigValue),
    Missing,
}

impl<'a> ConfigLookup<'a> {
    pub fn value(self) -> Option<&'a ConfigValue> {
        match self {
            ConfigLookup::Found(v) => Some(v),
            ConfigLookup::Missing => None,
        }
    }
}

/// Read access to configuration from inside templates and handlers.
pub trait ConfigSource: Send + Sync {
    fn get_config(&self, key: &str) -> Option<ConfigValue>;

    /// JSON view of the whole bag, injected as `config` into template data.
    fn snapshot(&self) -> serde_json::Value;
}

/// File-backed application configuration.
///
/// Field names on disk match the long-standing config file keys
/// (`tpl_dir`, `cache_tpls`, `sess_keys`, ...), so existing files keep
/// loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Interface to bind to, e.g. `0.0.0.0`.
    pub bind: String,
    pub port: u16,
    /// Retry on the next port when the configured one is already taken.
    #[serde(rename = "port_inc")]
    pub port_increment: bool,
    #[serde(rename = "tpl_dir")]
    pub template_directory: PathBuf,
    #[serde(rename = "cache_tpls")]
    pub cache_templates: bool,
    #[serde(rename = "asset_dir")]
    pub asset_directory: PathBuf,
    /// Session signing keys. The first signs, all of them verify.
    #[serde(rename = "sess_keys")]
    pub session_keys: Vec<String>,
    /// Serve unmatched GET requests from the asset directory (robots.txt etc).
    pub catch_all: bool,
    pub app_config: BTreeMap<String, ConfigValue>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 7000,
            port_increment: false,
            template_directory: PathBuf::from("tpls"),
            cache_templates: false,
            asset_directory: PathBuf::from("static"),
            session_keys: Vec::new(),
            catch_all: false,
            app_config: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load and validate a config file. YAML is parsed; JSON files load
    /// through the same parser.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("bind must not be empty".into()));
        }
        if self.session_keys.iter().any(|k| k.is_empty()) {
            return Err(ConfigError::Invalid(
                "sess_keys must not contain empty keys".into(),
            ));
        }
        Ok(())
    }

    /// `bind:port`, as handed to the listener.
    pub fn connection_string(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn lookup(&self, key: &str) -> ConfigLookup<'_> {
        match self.app_config.get(key) {
            Some(v) => ConfigLookup::Found(v),
            None => ConfigLookup::Missing,
        }
    }

    /// String value for `key`, or `""` when missing or not a string.
    pub fn get_config_string(&self, key: &str) -> String {
        self.lookup(key)
            .value()
            .and_then(ConfigValue::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Integer value for `key`, or `-1` when missing or not an integer.
    pub fn get_config_int(&self, key: &str) -> i64 {
        self.lookup(key)
            .value()
            .and_then(ConfigValue::as_int)
            .unwrap_or(-1)
    }

    /// Nested map for `key`, or `None` when missing or not a map.
    pub fn get_config_map(&self, key: &str) -> Option<&BTreeMap<String, ConfigValue>> {
        self.lookup(key).value().and_then(ConfigValue::as_map)
    }

    pub fn get_config_bool(&self, key: &str) -> bool {
        self.lookup(key)
            .value()
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false)
    }
}

impl ConfigSource for AppConfig {
    fn get_config(&self, key: &str) -> Option<ConfigValue> {
        self.app_config.get(key).cloned()
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.app_config).unwrap_or(serde_json::Value::Null)
    }
}
