// ⚙️ Configuration
//
// Read from the process environment after loading an optional `.env` file.
// Command-line flags override what is found here.

use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

pub const DATABASE_VAR: &str = "BANK_COMPARE_DATABASE";
pub const LOG_VAR: &str = "BANK_COMPARE_LOG";

pub const DEFAULT_DATABASE: &str = "bank_compare.db";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE),
            log_level: DEFAULT_LOG_LEVEL.into(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            database_path: var(DATABASE_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            log_level: var(LOG_VAR).unwrap_or(defaults.log_level),
        }
    }

    pub fn with_database(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.database_path = path;
        }
        self
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    fmt().with_env_filter(filter).with_target(false).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.database_path, PathBuf::from("bank_compare.db"));
    }

    #[test]
    fn test_env_values_used() {
        let config = Config::from_lookup(lookup(&[
            (DATABASE_VAR, "/tmp/compare.db"),
            (LOG_VAR, "debug"),
        ]));
        assert_eq!(config.database_path, PathBuf::from("/tmp/compare.db"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = Config::from_lookup(lookup(&[(LOG_VAR, "  ")]));
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_flag_overrides_env() {
        let config = Config::from_lookup(lookup(&[(DATABASE_VAR, "env.db")]))
            .with_database(Some(PathBuf::from("flag.db")));
        assert_eq!(config.database_path, PathBuf::from("flag.db"));

        let kept = Config::default().with_database(None);
        assert_eq!(kept.database_path, PathBuf::from(DEFAULT_DATABASE));
    }
}
