use std::env;
use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);
pub const DEFAULT_POOL_SIZE: u32 = 5;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("environment variable '{name}' has an invalid value '{value}': {reason}")]
    Invalid { name: &'static str, value: String, reason: String },
}

/// Process settings, read from the environment after loading `.env`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Postgres connection string. Without one, polls are kept in memory.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub pool_size: u32,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();
        Config::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = match var("BIND_ADDR") {
            Some(value) => value.trim().parse().map_err(|err: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: err.to_string(),
                value,
            })?,
            None => SocketAddr::from(DEFAULT_BIND_ADDR),
        };

        let pool_size = match var("DB_POOL_SIZE") {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(0) => return Err(ConfigError::Invalid {
                    name: "DB_POOL_SIZE",
                    value,
                    reason: String::from("must be at least 1"),
                }),
                Ok(size) => size,
                Err(err) => return Err(ConfigError::Invalid {
                    name: "DB_POOL_SIZE",
                    reason: err.to_string(),
                    value,
                }),
            },
            None => DEFAULT_POOL_SIZE,
        };

        let log_filter = var("RUST_LOG")
            .or_else(|| var("LOG_FILTER"))
            .unwrap_or_else(|| String::from(DEFAULT_LOG_FILTER));

        Ok(Config {
            database_url: var("DATABASE_URL"),
            bind_addr,
            pool_size,
            log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn explicit_values() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/polls"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("DB_POOL_SIZE", "12"),
            ("LOG_FILTER", "governance_poll=debug"),
        ]).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/polls"));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.pool_size, 12);
        assert_eq!(config.log_filter, "governance_poll=debug");
    }

    #[test]
    fn rust_log_wins_over_log_filter() {
        let config = config(&[("RUST_LOG", "warn"), ("LOG_FILTER", "debug")]).unwrap();
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn blank_database_url_means_memory() {
        assert_eq!(config(&[("DATABASE_URL", "  ")]).unwrap().database_url, None);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config(&[("BIND_ADDR", "localhost")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BIND_ADDR", .. }));

        let err = config(&[("DB_POOL_SIZE", "many")]).unwrap_err();
        assert!(err.to_string().contains("DB_POOL_SIZE"));

        let err = config(&[("DB_POOL_SIZE", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "DB_POOL_SIZE", .. }));
    }
}
