//! Runtime configuration read from the environment (and `.env`).

use std::env;
use std::time::Duration;

use crate::pricing::services::DEFAULT_STORE_TIMEOUT;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is not a valid number: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub store_timeout: Duration,
    pub sync_max_attempts: u32,
    /// Model names of the snapshot's provider to retire after each sync
    pub retired_models: Vec<String>,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        let store_timeout = parse_or(
            &lookup,
            "STORE_TIMEOUT_SECS",
            DEFAULT_STORE_TIMEOUT.as_secs(),
        )
        .map(Duration::from_secs)?;
        let sync_max_attempts = parse_or(&lookup, "SYNC_MAX_ATTEMPTS", 3)?;

        let retired_models = lookup("RETIRED_MODELS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            db_max_connections,
            store_timeout,
            sync_max_attempts,
            retired_models,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
