//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::txn::RetryPolicy;

/// Signing key used when `JWT_SECRET_KEY` is unset outside production.
const DEV_JWT_SECRET: &str = "ledger-service-development-secret";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Maximum attempts for a conflicting store transaction
    pub tx_max_attempts: u32,

    /// First retry delay; doubles on every further attempt
    pub tx_base_backoff: Duration,

    /// Deadline for one logical operation, claim waits included
    pub tx_operation_timeout: Duration,

    /// Lifetime of a cached account snapshot
    pub cache_ttl: Duration,

    /// HS256 key for access tokens
    pub jwt_secret: String,

    pub access_token_ttl: Duration,

    pub refresh_token_ttl: Duration,

    /// How long idempotency key rows are kept before cleanup
    pub idempotency_key_ttl: Duration,

    /// Tick of the maintenance job scheduler
    pub maintenance_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10)?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("PORT", 3000)?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let tx_max_attempts: u32 = parse_or("TX_MAX_ATTEMPTS", 3)?;
        if tx_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("TX_MAX_ATTEMPTS"));
        }
        let tx_base_backoff = Duration::from_millis(parse_or("TX_BASE_BACKOFF_MS", 200)?);
        let tx_operation_timeout = Duration::from_millis(parse_or("TX_OPERATION_TIMEOUT_MS", 10_000)?);

        let cache_ttl = Duration::from_secs(parse_or("CACHE_TTL_SECS", 5)?);

        let jwt_secret = match env::var("JWT_SECRET_KEY") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment == "production" => {
                return Err(ConfigError::MissingEnv("JWT_SECRET_KEY"));
            }
            _ => {
                tracing::warn!("JWT_SECRET_KEY not set, using development signing key");
                DEV_JWT_SECRET.to_string()
            }
        };

        let access_token_ttl = Duration::from_secs(parse_or("ACCESS_TOKEN_TTL_SECS", 900)?);
        let refresh_token_ttl = Duration::from_secs(parse_or("REFRESH_TOKEN_TTL_SECS", 604_800)?);
        let idempotency_key_ttl =
            Duration::from_secs(parse_or::<u64>("IDEMPOTENCY_KEY_TTL_HOURS", 24)? * 3600);
        let maintenance_interval = Duration::from_secs(parse_or("MAINTENANCE_INTERVAL_SECS", 60)?);

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            tx_max_attempts,
            tx_base_backoff,
            tx_operation_timeout,
            cache_ttl,
            jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            idempotency_key_ttl,
            maintenance_interval,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Retry policy handed to the transaction executor
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.tx_max_attempts, self.tx_base_backoff)
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
