//! Idempotency Repository
//!
//! Key rows live in `idempotency_keys`, keyed by (key_id, scope). Every function
//! taking a connection runs inside the caller's store transaction.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Longest accepted client key.
pub const MAX_KEY_LEN: usize = 255;

/// Idempotency key status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    Pending,
    Completed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::Pending => "PENDING",
            IdempotencyStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for IdempotencyStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(IdempotencyStatus::Pending),
            "COMPLETED" => Ok(IdempotencyStatus::Completed),
            other => Err(AppError::Internal(format!(
                "unknown idempotency key status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client key bound to the service and principal it was presented to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRequest {
    pub key: String,
    pub scope: String,
}

impl IdempotencyRequest {
    /// Validate the raw key and bind it to `service`, and to `principal` when present.
    pub fn new(key: &str, service: &str, principal: Option<Uuid>) -> AppResult<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidArgument(
                "idempotency key must not be empty".to_string(),
            ));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(AppError::InvalidArgument(format!(
                "idempotency key longer than {} bytes",
                MAX_KEY_LEN
            )));
        }

        let scope = match principal {
            Some(principal) => format!("{}:{}", service, principal),
            None => service.to_string(),
        };

        Ok(Self {
            key: key.to_string(),
            scope,
        })
    }
}

/// Stored idempotency key information
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key_id: String,
    pub scope: String,
    pub status: IdempotencyStatus,
    pub response_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    key_id: String,
    scope: String,
    status: String,
    response_payload: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = AppError;

    fn try_from(row: IdempotencyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key_id: row.key_id,
            scope: row.scope,
            status: row.status.parse()?,
            response_payload: row.response_payload,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

// =========================================================================
// Claim
// =========================================================================

/// Claim `request` for the current transaction or fetch the row that holds it.
///
/// The insert waits while another transaction holds an uncommitted claim on
/// the same (key, scope). Returns the row and whether it was already COMPLETED.
/// Under REPEATABLE READ or SERIALIZABLE the store reports a serialization
/// failure instead of exposing the winner's row, and the executor retries.
pub async fn claim_or_fetch(
    conn: &mut PgConnection,
    request: &IdempotencyRequest,
    ttl: Duration,
) -> AppResult<(IdempotencyRecord, bool)> {
    let inserted: Option<IdempotencyRow> = sqlx::query_as(
        r#"
        INSERT INTO idempotency_keys (key_id, scope, status, expires_at)
        VALUES ($1, $2, 'PENDING', NOW() + make_interval(secs => $3))
        ON CONFLICT (key_id, scope) DO NOTHING
        RETURNING key_id, scope, status, response_payload, created_at, expires_at
        "#,
    )
    .bind(&request.key)
    .bind(&request.scope)
    .bind(ttl.as_secs_f64())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = inserted {
        tracing::debug!(
            idempotency_key = %request.key,
            scope = %request.scope,
            "Claimed idempotency key"
        );
        return Ok((IdempotencyRecord::try_from(row)?, false));
    }

    let existing: Option<IdempotencyRow> = sqlx::query_as(
        r#"
        SELECT key_id, scope, status, response_payload, created_at, expires_at
        FROM idempotency_keys
        WHERE key_id = $1 AND scope = $2
        "#,
    )
    .bind(&request.key)
    .bind(&request.scope)
    .fetch_optional(&mut *conn)
    .await?;

    let record = match existing {
        Some(row) => IdempotencyRecord::try_from(row)?,
        // Deleted between the insert and the read
        None => {
            return Err(AppError::Conflict(format!(
                "idempotency key {} vanished during claim",
                request.key
            )))
        }
    };

    match record.status {
        IdempotencyStatus::Completed => Ok((record, true)),
        // Committed claims are always COMPLETED; a visible PENDING row was left behind
        IdempotencyStatus::Pending => Err(AppError::Internal(format!(
            "idempotency key {} is pending outside its transaction",
            request.key
        ))),
    }
}

/// Mark the claimed key COMPLETED with the serialized response.
pub async fn mark_complete<T: Serialize>(
    conn: &mut PgConnection,
    request: &IdempotencyRequest,
    response: &T,
) -> AppResult<()> {
    let payload = serde_json::to_value(response)?;

    let rows = sqlx::query(
        r#"
        UPDATE idempotency_keys
        SET status = 'COMPLETED', response_payload = $3, updated_at = NOW()
        WHERE key_id = $1 AND scope = $2 AND status = 'PENDING'
        "#,
    )
    .bind(&request.key)
    .bind(&request.scope)
    .bind(payload)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if rows != 1 {
        return Err(AppError::Internal(format!(
            "idempotency key {} was not pending at completion",
            request.key
        )));
    }

    Ok(())
}

/// Decode the stored response of a COMPLETED key.
pub fn replay<T: DeserializeOwned>(record: &IdempotencyRecord) -> AppResult<T> {
    let payload = record.response_payload.clone().ok_or_else(|| {
        AppError::Internal(format!(
            "idempotency key {} completed without a response",
            record.key_id
        ))
    })?;

    serde_json::from_value(payload).map_err(|e| {
        AppError::Internal(format!(
            "stored response for idempotency key {} is malformed: {}",
            record.key_id, e
        ))
    })
}

// =========================================================================
// Cleanup
// =========================================================================

/// Delete one key row. Returns whether a row was removed.
pub async fn delete_key(conn: &mut PgConnection, key: &str, scope: &str) -> AppResult<bool> {
    let rows = sqlx::query("DELETE FROM idempotency_keys WHERE key_id = $1 AND scope = $2")
        .bind(key)
        .bind(scope)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(rows > 0)
}

/// Delete key rows past their expiry.
pub async fn delete_expired(pool: &PgPool) -> AppResult<u64> {
    let rows = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at < NOW()")
        .execute(pool)
        .await?
        .rows_affected();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(payload: Option<serde_json::Value>) -> IdempotencyRecord {
        IdempotencyRecord {
            key_id: "k-1".to_string(),
            scope: "account".to_string(),
            status: IdempotencyStatus::Completed,
            response_payload: payload,
            created_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("PENDING".parse::<IdempotencyStatus>().unwrap(), IdempotencyStatus::Pending);
        assert_eq!(
            "COMPLETED".parse::<IdempotencyStatus>().unwrap(),
            IdempotencyStatus::Completed
        );
        assert!("processing".parse::<IdempotencyStatus>().is_err());
        assert_eq!(IdempotencyStatus::Completed.to_string(), "COMPLETED");
    }

    #[test]
    fn test_request_scope() {
        let principal = Uuid::new_v4();
        let scoped = IdempotencyRequest::new(" key-1 ", "account", Some(principal)).unwrap();
        assert_eq!(scoped.key, "key-1");
        assert_eq!(scoped.scope, format!("account:{}", principal));

        let unscoped = IdempotencyRequest::new("key-1", "auth", None).unwrap();
        assert_eq!(unscoped.scope, "auth");
    }

    #[test]
    fn test_request_rejects_bad_keys() {
        assert!(matches!(
            IdempotencyRequest::new("   ", "account", None),
            Err(AppError::InvalidArgument(_))
        ));
        let long = "k".repeat(MAX_KEY_LEN + 1);
        tokio_test::assert_err!(IdempotencyRequest::new(&long, "account", None));
        tokio_test::assert_ok!(IdempotencyRequest::new(&long[..MAX_KEY_LEN], "account", None));
    }

    #[test]
    fn test_replay_decodes_payload() {
        let record = completed(Some(serde_json::json!({"balance": 500})));
        let value: serde_json::Value = replay(&record).unwrap();
        assert_eq!(value["balance"], 500);
    }

    #[test]
    fn test_replay_rejects_malformed_payload() {
        #[derive(Debug, serde::Deserialize)]
        struct Expected {
            #[allow(dead_code)]
            balance: i64,
        }

        let malformed = completed(Some(serde_json::json!({"balance": "lots"})));
        assert!(matches!(replay::<Expected>(&malformed), Err(AppError::Internal(_))));

        let missing = completed(None);
        assert!(matches!(replay::<Expected>(&missing), Err(AppError::Internal(_))));
    }
}
