//! # Store Configuration
//!
//! Pool, migration and transaction-retry settings.
//!
//! ## Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::new(path)        builder, used by embedding applications    │
//! │  DbConfig::in_memory()      isolated store for tests                   │
//! │  DbConfig::from_env()       environment, used by the seed binary       │
//! │                                                                         │
//! │  KARDEX_DB_PATH              database file       (default ./kardex.db)  │
//! │  KARDEX_DB_MAX_CONNECTIONS   pool size           (default 5)            │
//! │  KARDEX_TX_MAX_ATTEMPTS      conflict retries    (default 5)            │
//! │  KARDEX_TX_RETRY_BACKOFF_MS  base backoff        (default 25)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("{key} must be at least {min}")]
    TooSmall { key: String, min: u64 },
}

/// Database configuration.
///
/// ## Example
/// ```rust
/// use kardex_db::DbConfig;
/// use std::time::Duration;
///
/// let config = DbConfig::new("/var/lib/kardex/kardex.db")
///     .max_connections(4)
///     .max_transaction_attempts(8)
///     .retry_backoff(Duration::from_millis(10));
/// assert_eq!(config.retry_policy().max_attempts, 8);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// How long SQLite waits on a locked database before reporting busy.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections
    /// open, which an in-memory store needs.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Attempts a conflicting transaction gets before giving up.
    /// Default: 5
    pub max_transaction_attempts: u32,

    /// First sleep after a conflict; later sleeps grow exponentially.
    /// Default: 25 ms
    pub retry_backoff: Duration,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
            max_transaction_attempts: 5,
            retry_backoff: Duration::from_millis(25),
        }
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// A single connection that never idles out: an in-memory SQLite database
    /// lives exactly as long as its connection.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            idle_timeout: None,
            run_migrations: true,
            max_transaction_attempts: 5,
            retry_backoff: Duration::from_millis(1),
        }
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = lookup("KARDEX_DB_PATH").unwrap_or_else(|| "./kardex.db".to_string());
        let mut config = if path == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(path)
        };

        if let Some(max) = parse_var::<u32>(&lookup, "KARDEX_DB_MAX_CONNECTIONS", 1)? {
            config.max_connections = max;
            config.min_connections = config.min_connections.min(max);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "KARDEX_TX_MAX_ATTEMPTS", 1)? {
            config.max_transaction_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "KARDEX_TX_RETRY_BACKOFF_MS", 0)? {
            config.retry_backoff = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Sets how many attempts a conflicting transaction gets.
    pub fn max_transaction_attempts(mut self, attempts: u32) -> Self {
        self.max_transaction_attempts = attempts.max(1);
        self
    }

    /// Sets the base backoff between transaction attempts.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Retry policy for the transaction runner.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_transaction_attempts.max(1),
            backoff: self.retry_backoff,
        }
    }

    pub(crate) fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    min: u64,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr + Into<u64> + Copy,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value: T = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    if value.into() < min {
        return Err(ConfigError::TooSmall {
            key: key.to_string(),
            min,
        });
    }
    Ok(Some(value))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .max_transaction_attempts(0);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.max_transaction_attempts, 1);
    }

    #[test]
    fn test_defaults_without_env() {
        let config = DbConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path, PathBuf::from("./kardex.db"));
        assert_eq!(config.max_transaction_attempts, 5);
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_env_overrides() {
        let config = DbConfig::from_lookup(lookup(&[
            ("KARDEX_DB_PATH", ":memory:"),
            ("KARDEX_TX_MAX_ATTEMPTS", "9"),
            ("KARDEX_TX_RETRY_BACKOFF_MS", "0"),
        ]))
        .unwrap();
        assert!(config.is_in_memory());
        assert_eq!(config.retry_policy().max_attempts, 9);
        assert_eq!(config.retry_backoff, Duration::ZERO);
    }

    #[test]
    fn test_bad_env_values() {
        assert!(matches!(
            DbConfig::from_lookup(lookup(&[("KARDEX_TX_MAX_ATTEMPTS", "lots")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            DbConfig::from_lookup(lookup(&[("KARDEX_DB_MAX_CONNECTIONS", "0")])),
            Err(ConfigError::TooSmall { .. })
        ));
    }
}
