//! Database configuration module.
//!
//! Provides configuration structures for database connection management.

use crate::env::{env_or, env_string};

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string (default: development URL)
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 20)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 2)
    /// - `DB_CONNECTION_TIMEOUT`: Connection timeout in seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT`: Idle timeout in seconds (default: 600)
    /// - `DB_MAX_LIFETIME`: Max lifetime in seconds (default: 1800)
    pub fn from_env() -> Self {
        let dev = Self::development();
        Self {
            database_url: env_string("DATABASE_URL").unwrap_or(dev.database_url),
            max_connections: env_or("DB_MAX_CONNECTIONS", dev.max_connections),
            min_connections: env_or("DB_MIN_CONNECTIONS", dev.min_connections),
            connection_timeout_secs: env_or("DB_CONNECTION_TIMEOUT", dev.connection_timeout_secs),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT", dev.idle_timeout_secs),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME", dev.max_lifetime_secs),
        }
    }

    /// Create a default configuration for development
    ///
    /// Uses `postgres://postgres@localhost/truco_db` as the database URL
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/truco_db".to_string(),
            max_connections: 20,
            min_connections: 2,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.database_url.starts_with("postgres://")
            && !self.database_url.starts_with("postgresql://")
        {
            return Err("Database URL must use the postgres:// scheme".to_string());
        }
        if self.max_connections == 0 {
            return Err("Max connections must be at least 1".to_string());
        }
        if self.min_connections > self.max_connections {
            return Err("Min connections cannot exceed max connections".to_string());
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_development_config_is_valid() {
        assert!(DatabaseConfig::development().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_pool_bounds() {
        let config = DatabaseConfig {
            min_connections: 30,
            ..DatabaseConfig::development()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_postgres_url() {
        let config = DatabaseConfig {
            database_url: "mysql://localhost/truco".to_string(),
            ..DatabaseConfig::development()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides_pool_size() {
        // SAFETY: serialized with the other env tests
        unsafe { std::env::set_var("DB_MAX_CONNECTIONS", "7") };
        let config = DatabaseConfig::from_env();
        unsafe { std::env::remove_var("DB_MAX_CONNECTIONS") };
        assert_eq!(config.max_connections, 7);
    }
}
