//! Environment-variable configuration with fail-fast validation.
//!
//! A `.env` file is honoured when present (development convenience); system
//! environment variables win otherwise. Required values are validated before
//! any component starts.

use std::env;

use thiserror::Error;

/// Configuration problems that abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent or empty.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A variable is present but unparsable.
    #[error("{name} is not valid: {value}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Runtime configuration for both binaries.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub App id (`GITHUB_APP_ID`).
    pub app_id: u64,
    /// Path to the App's RSA private key PEM (`GITHUB_PRIVATE_KEY_PATH`,
    /// default `./app.pem`).
    pub private_key_path: String,
    /// Shared webhook secret (`WEBHOOK_SECRET`).
    pub webhook_secret: String,
    /// HTTP port for the ingress listener (`PORT`, default `8080`).
    pub port: u16,
    /// Redis connection URL (`REDIS_URL`, default `redis://127.0.0.1:6379`).
    pub redis_url: String,
    /// Worker pool size (`WORKER_CONCURRENCY`, default 10).
    pub worker_concurrency: usize,
}

impl Config {
    /// Loads configuration from the environment (and `.env` when present).
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a required variable is missing or unparsable.
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found; using system environment");
        }

        let config = Self {
            app_id: parse_var("GITHUB_APP_ID")?.ok_or(ConfigError::Missing("GITHUB_APP_ID"))?,
            private_key_path: string_var("GITHUB_PRIVATE_KEY_PATH")
                .unwrap_or_else(|| "./app.pem".to_string()),
            webhook_secret: string_var("WEBHOOK_SECRET")
                .ok_or(ConfigError::Missing("WEBHOOK_SECRET"))?,
            port: parse_var("PORT")?.unwrap_or(8080),
            redis_url: string_var("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            worker_concurrency: parse_var("WORKER_CONCURRENCY")?.unwrap_or(10),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id == 0 {
            return Err(ConfigError::Invalid {
                name: "GITHUB_APP_ID",
                value: "0".to_string(),
            });
        }
        if self.webhook_secret.is_empty() {
            return Err(ConfigError::Missing("WEBHOOK_SECRET"));
        }
        Ok(())
    }

    /// The socket address the listener binds.
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match string_var(name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
