//! Agent configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ErrorCode;

pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ROLE_LIST_LIMIT: usize = 100;
pub const DEFAULT_USERS_FILE: &str = "users.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required env var {0}")]
    Missing(&'static str),

    /// An environment variable is set but unusable.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing(_) => "E_CONFIG_MISSING",
            Self::Invalid { .. } => "E_CONFIG_INVALID",
        }
    }
}

/// Pause between reconnection attempts, optionally doubling up to a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub ceiling: Option<Duration>,
}

impl RetryPolicy {
    /// Fixed interval, no backoff.
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self { interval, ceiling: None }
    }

    /// Pause to use after `delay` did not lead to a connection.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        match self.ceiling {
            Some(ceiling) if ceiling > self.interval => delay.saturating_mul(2).min(ceiling),
            _ => self.interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// `ws://` or `wss://` endpoint of the coordinator.
    pub url: String,
    pub retry: RetryPolicy,
    pub handshake_timeout: Duration,
    /// `GetRoles` limit when the request leaves it blank.
    pub role_list_limit: usize,
    pub users_file: PathBuf,
}

impl AgentConfig {
    /// Config with defaults for everything but the endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry: RetryPolicy::default(),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            role_list_limit: DEFAULT_ROLE_LIST_LIMIT,
            users_file: PathBuf::from(DEFAULT_USERS_FILE),
        }
    }

    /// Build typed agent config from environment variables.
    ///
    /// Required:
    /// - `USERSTORE_COORDINATOR_URL`
    ///
    /// Optional:
    /// - `USERSTORE_RETRY_INTERVAL_MS`: default 2000
    /// - `USERSTORE_RETRY_CEILING_MS`: unset means a fixed interval
    /// - `USERSTORE_HANDSHAKE_TIMEOUT_MS`: default 10000
    /// - `USERSTORE_ROLE_LIST_LIMIT`: default 100
    /// - `USERSTORE_USERS_FILE`: default `users.json`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing URL or unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("USERSTORE_COORDINATOR_URL")
            .map_err(|_| ConfigError::Missing("USERSTORE_COORDINATOR_URL"))?;
        validate_url(&url)?;

        let interval_ms = env_parse("USERSTORE_RETRY_INTERVAL_MS", DEFAULT_RETRY_INTERVAL_MS)?;
        let ceiling_ms = env_parse_opt::<u64>("USERSTORE_RETRY_CEILING_MS")?;
        let handshake_ms = env_parse("USERSTORE_HANDSHAKE_TIMEOUT_MS", DEFAULT_HANDSHAKE_TIMEOUT_MS)?;
        let role_list_limit = env_parse("USERSTORE_ROLE_LIST_LIMIT", DEFAULT_ROLE_LIST_LIMIT)?;
        let users_file = std::env::var("USERSTORE_USERS_FILE").unwrap_or_else(|_| DEFAULT_USERS_FILE.to_owned());

        non_zero("USERSTORE_RETRY_INTERVAL_MS", interval_ms)?;
        non_zero("USERSTORE_HANDSHAKE_TIMEOUT_MS", handshake_ms)?;
        non_zero("USERSTORE_ROLE_LIST_LIMIT", u64::try_from(role_list_limit).unwrap_or(u64::MAX))?;

        Ok(Self {
            url,
            retry: RetryPolicy {
                interval: Duration::from_millis(interval_ms),
                ceiling: ceiling_ms.map(Duration::from_millis),
            },
            handshake_timeout: Duration::from_millis(handshake_ms),
            role_list_limit,
            users_file: PathBuf::from(users_file),
        })
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        var: "USERSTORE_COORDINATOR_URL",
        reason: format!("expected ws:// or wss:// URL, got {url}"),
    })
}

fn non_zero(var: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid { var, reason: "must be greater than zero".into() });
    }
    Ok(())
}

fn env_parse<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_parse_opt(var)?.unwrap_or(default))
}

fn env_parse_opt<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid { var, reason: format!("{raw:?}: {e}") })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
