//! Process configuration read from `WORKFLOW_*` environment variables.

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Deployment environment; `production`/`prod` switch logging to JSON.
    pub env: String,
    pub bind_addr: String,
    /// When absent the server falls back to the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let db_max_connections = match get("WORKFLOW_DB_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        key: "WORKFLOW_DB_MAX_CONNECTIONS",
                        message: "must be at least 1".into(),
                    })
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: "WORKFLOW_DB_MAX_CONNECTIONS",
                        message: format!("{raw:?}: {e}"),
                    })
                }
            },
        };

        Ok(Self {
            env: get("WORKFLOW_ENV").unwrap_or_else(|| "development".into()),
            bind_addr: get("WORKFLOW_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            database_url: get("WORKFLOW_DATABASE_URL"),
            db_max_connections,
        })
    }

    pub fn is_production(&self) -> bool {
        matches!(self.env.to_ascii_lowercase().as_str(), "production" | "prod")
    }
}
