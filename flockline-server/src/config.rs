//! Startup configuration read from environment variables.
//!
//! Bounded settings are `nutype` newtypes, so a value that fails validation
//! is reported as a [`ConfigError`] naming the offending variable instead of
//! surfacing later as odd runtime behaviour.

use flockline::{MaxRetryAttempts, RetryBaseDelayMs, RetryConfig};
use flockline_postgres::{MaxConnections, PostgresConfig};
use nutype::nutype;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use thiserror::Error;

const BIND_ADDR: &str = "FLOCKLINE_BIND_ADDR";
const DATABASE_URL: &str = "DATABASE_URL";
const DB_MAX_CONNECTIONS: &str = "FLOCKLINE_DB_MAX_CONNECTIONS";
const JWT_SECRET: &str = "FLOCKLINE_JWT_SECRET";
const TOKEN_TTL_DAYS: &str = "FLOCKLINE_TOKEN_TTL_DAYS";
const RETRY_MAX_ATTEMPTS: &str = "FLOCKLINE_RETRY_MAX_ATTEMPTS";
const RETRY_BASE_DELAY_MS: &str = "FLOCKLINE_RETRY_BASE_DELAY_MS";
const LOG_FORMAT: &str = "FLOCKLINE_LOG_FORMAT";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// A configuration variable was missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{variable} must be set")]
    Missing {
        /// Variable name
        variable: &'static str,
    },
    /// A variable is set to an unusable value.
    #[error("{variable} is invalid: {reason}")]
    Invalid {
        /// Variable name
        variable: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

impl ConfigError {
    fn invalid(variable: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            variable,
            reason: reason.to_string(),
        }
    }
}

/// Secret used to sign bearer tokens. At least 16 characters.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 16),
    derive(Clone, AsRef)
)]
pub struct JwtSecret(String);

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JwtSecret(***)")
    }
}

/// Lifetime of an issued token in days, between 1 and 365.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 365),
    default = 30,
    derive(Debug, Clone, Copy, PartialEq, Eq, Display, Into, Default)
)]
pub struct TokenTtlDays(u32);

/// Shape of log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{other}'")),
        }
    }
}

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening address
    pub bind_addr: SocketAddr,
    /// PostgreSQL connection string. The in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Pool settings used with `database_url`
    pub postgres: PostgresConfig,
    /// Token signing secret
    pub jwt_secret: JwtSecret,
    /// Token lifetime
    pub token_ttl: TokenTtlDays,
    /// Conflict retry settings for the command executor
    pub retry: RetryConfig,
    /// Log output shape
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns a variable's
    /// value or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = value(BIND_ADDR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .trim()
            .parse::<SocketAddr>()
            .map_err(|error| ConfigError::invalid(BIND_ADDR, error))?;

        let mut postgres = PostgresConfig::default();
        if let Some(raw) = value(DB_MAX_CONNECTIONS) {
            let connections = parse::<NonZeroU32>(DB_MAX_CONNECTIONS, &raw)?;
            postgres.max_connections = MaxConnections::new(connections);
        }

        let jwt_secret = value(JWT_SECRET)
            .ok_or(ConfigError::Missing {
                variable: JWT_SECRET,
            })
            .and_then(|raw| {
                JwtSecret::try_new(raw).map_err(|error| ConfigError::invalid(JWT_SECRET, error))
            })?;

        let token_ttl = match value(TOKEN_TTL_DAYS) {
            Some(raw) => TokenTtlDays::try_new(parse(TOKEN_TTL_DAYS, &raw)?)
                .map_err(|error| ConfigError::invalid(TOKEN_TTL_DAYS, error))?,
            None => TokenTtlDays::default(),
        };

        let retry = retry_config(&value)?;

        let log_format = match value(LOG_FORMAT) {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|reason| ConfigError::invalid(LOG_FORMAT, reason))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            database_url: value(DATABASE_URL),
            postgres,
            jwt_secret,
            token_ttl,
            retry,
            log_format,
        })
    }
}

fn retry_config<F>(value: &F) -> Result<RetryConfig, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    let attempts = value(RETRY_MAX_ATTEMPTS);
    let base_delay = value(RETRY_BASE_DELAY_MS);
    if attempts.is_none() && base_delay.is_none() {
        return Ok(RetryConfig::default());
    }

    let defaults = RetryConfig::default();
    let attempts = match attempts {
        Some(raw) => parse(RETRY_MAX_ATTEMPTS, &raw)?,
        None => defaults.max_attempts,
    };
    let base_delay = match base_delay {
        Some(raw) => parse(RETRY_BASE_DELAY_MS, &raw)?,
        None => u64::try_from(defaults.base_delay.as_millis())
            .map_err(|error| ConfigError::invalid(RETRY_BASE_DELAY_MS, error))?,
    };

    let attempts = MaxRetryAttempts::try_new(attempts)
        .map_err(|error| ConfigError::invalid(RETRY_MAX_ATTEMPTS, error))?;
    let base_delay = RetryBaseDelayMs::try_new(base_delay)
        .map_err(|error| ConfigError::invalid(RETRY_BASE_DELAY_MS, error))?;
    Ok(RetryConfig::from_settings(attempts, base_delay))
}

fn parse<T>(variable: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|error| ConfigError::invalid(variable, error))
}
