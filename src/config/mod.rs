//! # Configuration Module
//!
//! Two layers of configuration feed a gantry application:
//!
//! - [`AppConfig`] - the file-backed application config (bind address, port,
//!   template and asset directories, session keys and an open
//!   application-specific bag of [`ConfigValue`]s). Loaded once at startup;
//!   a load failure is fatal.
//! - [`RuntimeConfig`] - process tuning read from `GANTRY_*` environment
//!   variables (worker threads, port retry delay).
//!
//! ## Example
//!
//! ```yaml
//! bind: 127.0.0.1
//! port: 7000
//! port_inc: true
//! tpl_dir: tpls
//! cache_tpls: true
//! asset_dir: static
//! sess_keys: ["first-signing-key"]
//! app_config:
//!   site_name: Example
//!   page_size: 20
//!   smtp: { host: localhost, port: 25 }
//! ```
//!
//! ```rust,no_run
//! use gantry::config::AppConfig;
//!
//! let config = AppConfig::from_file("config.yaml").expect("config");
//! assert_eq!(config.get_config_string("site_name"), "Example");
//! assert_eq!(config.get_config_int("missing"), -1);
//! ```

mod app;
mod runtime;

pub use app::{AppConfig, ConfigError, ConfigLookup, ConfigSource, ConfigValue};
pub use runtime::RuntimeConfig;
