//! Server configuration management.
//!
//! Combines the library configs with the CLI overrides and validates the
//! result before anything is started.

use std::time::Duration;
use truco::{Backend, ServicesConfig, db::DatabaseConfig};

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Store backend and per-service settings
    pub services: ServicesConfig,
    /// Time between maintenance passes
    pub maintenance_interval: Duration,
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Database URL (`--db-url`)
    pub database_url: Option<String>,
    /// Use the in-memory store (`--memory`)
    pub memory: bool,
    /// Apply migrations on startup (`--migrate`)
    pub migrate: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `overrides` - Values from the command line, which win over the
    ///   environment
    ///
    /// # Errors
    ///
    /// * `ConfigError::MissingRequired` - Postgres backend without a database URL
    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        let mut services = ServicesConfig::from_env();

        if overrides.memory {
            services.backend = Backend::Memory;
        } else {
            let database_url = overrides
                .database_url
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingRequired {
                    var: "DATABASE_URL".to_string(),
                    hint: "Pass --db-url, or --memory for a throwaway in-memory store".to_string(),
                })?;
            services.backend = Backend::Postgres(DatabaseConfig {
                database_url,
                ..DatabaseConfig::from_env()
            });
        }
        services.migrate |= overrides.migrate;

        Ok(ServerConfig {
            services,
            maintenance_interval: Duration::from_secs(parse_env_or(
                "MAINTENANCE_INTERVAL_SECS",
                15,
            )),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Backend::Postgres(database) = &self.services.backend {
            database.validate().map_err(|reason| ConfigError::Invalid {
                var: "DATABASE_URL".to_string(),
                reason,
            })?;
        }

        self.services
            .wallet
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "PAYOUT_MULTIPLIER_BPS".to_string(),
                reason,
            })?;

        self.services
            .rooms
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "ROOM_*".to_string(),
                reason,
            })?;

        self.services
            .payment
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "PAYMENT_*".to_string(),
                reason,
            })?;

        if self.maintenance_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "MAINTENANCE_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn memory_config() -> ServerConfig {
        ServerConfig {
            services: ServicesConfig::in_memory(),
            maintenance_interval: Duration::from_secs(15),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "DATABASE_URL".to_string(),
            hint: "Pass --db-url".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DATABASE_URL"));
        assert!(msg.contains("Pass --db-url"));
    }

    #[test]
    fn test_memory_config_validates() {
        assert!(memory_config().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_low_payout() {
        let mut config = memory_config();
        config.services.wallet.payout_multiplier_bps = 9_000;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == "PAYOUT_MULTIPLIER_BPS"));
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut config = memory_config();
        config.maintenance_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_postgres_requires_database_url() {
        // SAFETY: serialized with the other env tests
        unsafe {
            std::env::remove_var("DATABASE_URL");
        }
        let err = ServerConfig::from_env(Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    #[serial]
    fn test_cli_overrides_win() {
        // SAFETY: serialized with the other env tests
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://env@localhost/truco");
            std::env::set_var("MAINTENANCE_INTERVAL_SECS", "5");
        }
        let config = ServerConfig::from_env(Overrides {
            database_url: Some("postgres://cli@localhost/truco".to_string()),
            memory: false,
            migrate: true,
        })
        .unwrap();
        unsafe {
            std::env::remove_var("DATABASE_URL");
            std::env::remove_var("MAINTENANCE_INTERVAL_SECS");
        }

        assert!(config.services.migrate);
        assert_eq!(config.maintenance_interval, Duration::from_secs(5));
        match config.services.backend {
            Backend::Postgres(db) => assert_eq!(db.database_url, "postgres://cli@localhost/truco"),
            Backend::Memory => panic!("expected postgres backend"),
        }
    }

    #[test]
    #[serial]
    fn test_memory_flag_needs_no_database() {
        // SAFETY: serialized with the other env tests
        unsafe {
            std::env::remove_var("DATABASE_URL");
        }
        let config = ServerConfig::from_env(Overrides {
            memory: true,
            ..Overrides::default()
        })
        .unwrap();
        assert_eq!(config.services.backend, Backend::Memory);
    }
}
