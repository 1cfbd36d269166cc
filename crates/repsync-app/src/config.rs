//! Configuration for the sync server binary.
//!
//! Everything comes from the environment with sensible defaults; the only
//! structural decision is the storage backend: a `DATABASE_URL` selects
//! PostgreSQL, its absence selects the in-memory stores (demo mode, nothing
//! survives a restart).

use std::env;
use std::sync::Arc;

use repsync_api::db::DbPool;

/// Configuration errors that can occur during startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable value for {var_name}: {value}")]
    InvalidEnvVar { var_name: String, value: String },

    #[error("Database initialization failed: {source}")]
    DatabaseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Which storage the server runs on.
pub enum StorageBackend {
    Postgres(Arc<DbPool>),
    InMemory,
}

pub struct AppConfig {
    pub host: String,
    pub port: String,
    pub storage: StorageBackend,
    pub rebuild_after_events: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        let rebuild_after_events = Self::parse_env_var("REBUILD_AFTER_EVENTS", 50)?;

        let storage = match env::var("DATABASE_URL") {
            Ok(_) => {
                let pool = repsync_api::db::init_pool()
                    .map_err(|e| ConfigError::DatabaseError {
                        source: Box::new(e),
                    })?;
                StorageBackend::Postgres(Arc::new(pool))
            }
            Err(_) => StorageBackend::InMemory,
        };

        Ok(AppConfig {
            host,
            port,
            storage,
            rebuild_after_events,
        })
    }

    fn parse_env_var(var_name: &str, default_value: usize) -> Result<usize, ConfigError> {
        let value_str = env::var(var_name).unwrap_or_else(|_| default_value.to_string());
        value_str.parse().map_err(|_| ConfigError::InvalidEnvVar {
            var_name: var_name.to_string(),
            value: value_str,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_var_with_default() {
        let test_var = "TEST_REBUILD_DEFAULT";
        env::remove_var(test_var);
        assert_eq!(AppConfig::parse_env_var(test_var, 50).unwrap(), 50);
    }

    #[test]
    fn parse_env_var_invalid_value() {
        let test_var = "TEST_REBUILD_INVALID";
        env::set_var(test_var, "not-a-number");

        let result = AppConfig::parse_env_var(test_var, 50);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvVar { .. })
        ));

        env::remove_var(test_var);
    }
}
