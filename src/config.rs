use log::warn;
use thiserror::Error;

use std::env;
use std::path::PathBuf;

use crate::ledger::BalanceStrategy;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "data/ledger";

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Where the ledger is persisted; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,

    pub balance_strategy: BalanceStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_dir: Some(PathBuf::from(DEFAULT_DATA_DIR)),
            balance_strategy: BalanceStrategy::default(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment, after loading
    /// a `.env` file if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                warn!("Ignoring unreadable .env file: {}", err);
            }
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("LEDGER_HOST") {
            config.host = host;
        }

        if let Some(port) = lookup("LEDGER_PORT") {
            config.port = port.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    name: "LEDGER_PORT",
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(data_dir) = lookup("LEDGER_DATA_DIR") {
            config.data_dir = if data_dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(data_dir))
            };
        }

        if let Some(strategy) = lookup("LEDGER_BALANCE_STRATEGY") {
            config.balance_strategy = strategy
                .parse()
                .map_err(|reason| ConfigError::InvalidValue {
                    name: "LEDGER_BALANCE_STRATEGY",
                    reason,
                })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, Some(PathBuf::from("data/ledger")));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("LEDGER_HOST", "0.0.0.0"),
            ("LEDGER_PORT", "9000"),
            ("LEDGER_DATA_DIR", ""),
            ("LEDGER_BALANCE_STRATEGY", "replay"),
        ]))
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, None);
        assert_eq!(config.balance_strategy, BalanceStrategy::Replay);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("LEDGER_PORT", "eighty")])),
            Err(ConfigError::InvalidValue { name: "LEDGER_PORT", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("LEDGER_BALANCE_STRATEGY", "guess")])),
            Err(ConfigError::InvalidValue { name: "LEDGER_BALANCE_STRATEGY", .. })
        ));
    }
}
