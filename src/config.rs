//! Store configuration.
//!
//! Connection settings for the metadata database, read from the environment
//! with sensible defaults for a local SQLite file.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

pub const DATABASE_URL_VAR: &str = "METASTORE_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "METASTORE_MAX_CONNECTIONS";
pub const ACQUIRE_TIMEOUT_VAR: &str = "METASTORE_ACQUIRE_TIMEOUT_SECS";
pub const CREATE_IF_MISSING_VAR: &str = "METASTORE_CREATE_IF_MISSING";

/// Configuration for the metadata store connection.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite connection URL (e.g. `sqlite://metastore.db` or `sqlite::memory:`).
    pub database_url: String,
    /// Upper bound of pooled connections. In-memory databases always use one.
    pub max_connections: u32,
    /// How long a caller waits for a pooled connection.
    pub acquire_timeout: Duration,
    /// Create the database file when it does not exist yet.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://metastore.db".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::default().with_database_url("sqlite::memory:")
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `METASTORE_DATABASE_URL`: connection URL (default: sqlite://metastore.db)
    /// - `METASTORE_MAX_CONNECTIONS`: pool size (default: 5)
    /// - `METASTORE_ACQUIRE_TIMEOUT_SECS`: acquire timeout (default: 30)
    /// - `METASTORE_CREATE_IF_MISSING`: create the database file (default: true)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(DATABASE_URL_VAR) {
            config.database_url = val;
        }

        if let Ok(val) = std::env::var(MAX_CONNECTIONS_VAR) {
            config.max_connections = parse_env_value(&val, MAX_CONNECTIONS_VAR)?;
        }

        if let Ok(val) = std::env::var(ACQUIRE_TIMEOUT_VAR) {
            let secs: u64 = parse_env_value(&val, ACQUIRE_TIMEOUT_VAR)?;
            config.acquire_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var(CREATE_IF_MISSING_VAR) {
            config.create_if_missing = parse_env_bool(&val, CREATE_IF_MISSING_VAR)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if !self.database_url.starts_with("sqlite:") {
            return Err(ConfigError::ValidationFailed(format!(
                "database_url must be a sqlite: URL, got '{}'",
                self.database_url
            )));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.acquire_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "acquire_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the URL names an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Pool size actually used; an in-memory database lives in a single
    /// connection.
    pub fn effective_max_connections(&self) -> u32 {
        if self.is_in_memory() {
            1
        } else {
            self.max_connections
        }
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the pool size.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder method to set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Builder method to toggle database file creation.
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.database_url, "sqlite://metastore.db");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert!(config.create_if_missing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::new()
            .with_database_url("sqlite:///tmp/meta.db")
            .with_max_connections(8)
            .with_acquire_timeout(Duration::from_secs(5))
            .with_create_if_missing(false);

        assert_eq!(config.database_url, "sqlite:///tmp/meta.db");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert!(!config.create_if_missing);
    }

    #[test]
    fn test_in_memory_uses_single_connection() {
        let config = StoreConfig::in_memory().with_max_connections(10);
        assert!(config.is_in_memory());
        assert_eq!(config.effective_max_connections(), 1);

        let config = StoreConfig::default().with_max_connections(10);
        assert!(!config.is_in_memory());
        assert_eq!(config.effective_max_connections(), 10);
    }

    #[test]
    fn test_validation_empty_url() {
        let result = StoreConfig::default().with_database_url("").validate();
        assert!(result.unwrap_err().to_string().contains("database_url"));
    }

    #[test]
    fn test_validation_rejects_other_engines() {
        let result = StoreConfig::default()
            .with_database_url("postgres://localhost/meta")
            .validate();
        assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn test_validation_zero_connections() {
        let result = StoreConfig::default().with_max_connections(0).validate();
        assert!(result.unwrap_err().to_string().contains("max_connections"));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let result = StoreConfig::default()
            .with_acquire_timeout(Duration::from_secs(0))
            .validate();
        assert!(result.unwrap_err().to_string().contains("acquire_timeout"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "TEST").unwrap());
        assert!(parse_env_bool("YES", "TEST").unwrap());
        assert!(!parse_env_bool("0", "TEST").unwrap());
        assert!(!parse_env_bool("off", "TEST").unwrap());
        assert!(parse_env_bool("maybe", "TEST").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let n: u32 = parse_env_value("12", "TEST").unwrap();
        assert_eq!(n, 12);

        let err = parse_env_value::<u32>("twelve", "TEST").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(err.to_string().contains("TEST"));
    }
}
