//! services/store/src/config.rs
//!
//! Defines the store configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables. The `.env` file is
//! used for local development.

use bookshelf_core::PortError;
use std::fmt;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_DATABASE_NAME: &str = "bookshelf";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

impl From<ConfigError> for PortError {
    fn from(err: ConfigError) -> Self {
        PortError::Configuration(err.to_string())
    }
}

/// Everything needed to reach the document store.
#[derive(Clone)]
pub struct StoreConfig {
    /// Full connection string. May embed credentials, so it is never logged.
    pub mongo_uri: String,
    /// Used when the connection string names no database.
    pub database_name: String,
    /// Upper bound on every individual store call.
    pub timeout: Duration,
    pub log_level: Level,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("mongo_uri", &"<redacted>")
            .field("database_name", &self.database_name)
            .field("timeout", &self.timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl StoreConfig {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mongo_uri = lookup("MONGO_URI")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("MONGO_URI".to_string()))?;

        let database_name = lookup("MONGO_DB_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string());

        let timeout = match lookup("MONGO_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().ok().filter(|&s| s > 0).ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "MONGO_TIMEOUT_SECS".to_string(),
                        format!("'{}' is not a positive number of seconds", raw),
                    )
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            mongo_uri,
            database_name,
            timeout,
            log_level,
        })
    }
}
