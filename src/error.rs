//! Error handling module
//!
//! Centralized error types, store error classification and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::config::ConfigError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// SQLSTATE raised when a transaction cannot be serialized against a concurrent one.
pub const SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE raised when an insert or update collides with a unique constraint.
pub const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE raised when `lock_timeout` expires.
pub const LOCK_NOT_AVAILABLE: &str = "55P03";

/// SQLSTATE raised when `statement_timeout` or a cancel request stops a statement.
pub const QUERY_CANCELED: &str = "57014";

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Absorbed by the transaction executor; only escapes wrapped in RetriesExhausted
    #[error("Serialization conflict: {0}")]
    Conflict(String),

    #[error("Operation {operation} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        last: Box<AppError>,
    },

    #[error("Operation {0} timed out")]
    Timeout(&'static str),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// Whether the executor may retry the whole store transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidArgument(_)
                | AppError::NotFound(_)
                | AppError::NotAuthorized
                | AppError::NotAuthenticated
                | AppError::AlreadyExists(_)
                | AppError::MissingHeader(_)
        )
    }
}

/// Closed classification of store failures, decided once at the store boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// Concurrent transaction conflict; the whole transaction may be retried.
    SerializationConflict,
    /// Duplicate unique value; never retried.
    UniqueViolation,
    /// Lock wait or statement stopped by a store-side timeout.
    TimedOut,
    /// Anything else; never retried.
    Fatal,
}

impl StoreFault {
    /// Classify a SQLSTATE code.
    pub fn from_code(code: &str) -> Self {
        match code {
            SERIALIZATION_FAILURE => StoreFault::SerializationConflict,
            UNIQUE_VIOLATION => StoreFault::UniqueViolation,
            LOCK_NOT_AVAILABLE | QUERY_CANCELED => StoreFault::TimedOut,
            _ => StoreFault::Fatal,
        }
    }

    /// Classify a store error.
    pub fn classify(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .map(|code| Self::from_code(&code))
                .unwrap_or(StoreFault::Fatal),
            _ => StoreFault::Fatal,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return AppError::NotFound("record".to_string());
        }

        match StoreFault::classify(&err) {
            StoreFault::SerializationConflict => AppError::Conflict(err.to_string()),
            StoreFault::UniqueViolation => {
                let constraint = match &err {
                    sqlx::Error::Database(db_err) => db_err
                        .constraint()
                        .unwrap_or("unique constraint")
                        .to_string(),
                    _ => "unique constraint".to_string(),
                };
                AppError::AlreadyExists(constraint)
            }
            // Renamed to the operation by the transaction executor
            StoreFault::TimedOut => AppError::Timeout("store"),
            StoreFault::Fatal => AppError::Database(err),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidArgument(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_argument", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // 401 Unauthorized
            AppError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "not_authenticated", None),

            // 403 Forbidden
            AppError::NotAuthorized => (StatusCode::FORBIDDEN, "not_authorized", None),

            // 404 Not Found
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", Some(what.clone())),

            // 409 Conflict
            AppError::AlreadyExists(what) => {
                (StatusCode::CONFLICT, "already_exists", Some(what.clone()))
            }

            // 504 Gateway Timeout
            AppError::Timeout(operation) => {
                tracing::warn!(operation = %operation, "Operation timed out");
                (StatusCode::GATEWAY_TIMEOUT, "timeout", None)
            }

            // 500 Internal Server Error
            AppError::Conflict(msg) => {
                tracing::error!("Unabsorbed serialization conflict: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::RetriesExhausted { operation, attempts, last } => {
                tracing::error!(
                    operation = %operation,
                    attempts = attempts,
                    "Retries exhausted: {}",
                    last
                );
                (StatusCode::INTERNAL_SERVER_ERROR, "retries_exhausted", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        // Server-side failures keep their cause in the logs only
        let error = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
