//! Process tuning read from environment variables.
//!
//! ## Environment Variables
//!
//! ### `GANTRY_WORKERS`
//!
//! Number of worker threads pulling requests off the shared listener. Each
//! worker handles one request at a time, start to finish.
//!
//! Default: `4`
//!
//! ### `GANTRY_PORT_RETRY_MS`
//!
//! Delay before retrying the next port when `port_inc` is enabled and the
//! current port is already in use.
//!
//! Default: `100`

use std::env;
use std::time::Duration;

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_PORT_RETRY_MS: u64 = 100;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub port_retry_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            port_retry_delay: Duration::from_millis(DEFAULT_PORT_RETRY_MS),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let workers = lookup("GANTRY_WORKERS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_WORKERS);
        let retry_ms = lookup("GANTRY_PORT_RETRY_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_PORT_RETRY_MS);
        RuntimeConfig {
            workers,
            port_retry_delay: Duration::from_millis(retry_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_reads_overrides() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            ("GANTRY_WORKERS", "8"),
            ("GANTRY_PORT_RETRY_MS", "250"),
        ]));
        assert_eq!(config.workers, 8);
        assert_eq!(config.port_retry_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_or_garbage_workers_fall_back() {
        let zero = RuntimeConfig::from_lookup(lookup_from(&[("GANTRY_WORKERS", "0")]));
        assert_eq!(zero.workers, DEFAULT_WORKERS);
        let junk = RuntimeConfig::from_lookup(lookup_from(&[("GANTRY_WORKERS", "lots")]));
        assert_eq!(junk.workers, DEFAULT_WORKERS);
    }
}
