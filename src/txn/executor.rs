//! Retrying Transaction Executor
//!
//! Opens a store transaction at the requested isolation level, runs a body
//! closure against it, commits, and retries the whole unit on serialization
//! conflicts.
//!
//! Dropping the returned future drops the open `sqlx::Transaction`, which rolls
//! it back, so a cancelled or timed-out request never commits a partial effect.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tokio::time::Instant;

use crate::error::{AppError, AppResult};
use crate::idempotency::{self, IdempotencyRequest};

use super::{AccessMode, IsolationLevel, RetryDecision, RetryPolicy};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(24 * 3600);

/// Future returned by a transaction body, borrowing the connection for `'c`.
pub type TxBody<'c, T> = BoxFuture<'c, AppResult<T>>;

#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    pool: PgPool,
    policy: RetryPolicy,
    operation_timeout: Duration,
    key_ttl: Duration,
}

impl TransactionExecutor {
    pub fn new(pool: PgPool, policy: RetryPolicy) -> Self {
        Self {
            pool,
            policy,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            key_ttl: DEFAULT_KEY_TTL,
        }
    }

    /// Deadline for a whole logical operation, retries and claim waits included.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Lifetime of idempotency key rows claimed through this executor.
    pub fn with_key_ttl(mut self, ttl: Duration) -> Self {
        self.key_ttl = ttl;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    // =========================================================================
    // Run
    // =========================================================================

    /// Run `body` in a read-write transaction, retrying on serialization conflicts.
    ///
    /// The body may run several times. It must capture only owned data and
    /// must not have effects outside the store transaction it is handed.
    pub async fn run<T, F>(
        &self,
        operation: &'static str,
        isolation: IsolationLevel,
        mut body: F,
    ) -> AppResult<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut PgConnection) -> TxBody<'c, T> + Send,
    {
        let deadline = Instant::now() + self.operation_timeout;
        let work = self.run_with_retries(operation, isolation, deadline, &mut body);
        match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => tag_timeout(operation, result),
            Err(_) => {
                tracing::warn!(
                    operation = operation,
                    timeout_ms = self.operation_timeout.as_millis() as u64,
                    "Transaction deadline exceeded, rolled back"
                );
                Err(AppError::Timeout(operation))
            }
        }
    }

    /// Run a read-only body once in a REPEATABLE READ snapshot. Never retried.
    pub async fn read_snapshot<T, F>(&self, operation: &'static str, mut body: F) -> AppResult<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut PgConnection) -> TxBody<'c, T> + Send,
    {
        let deadline = Instant::now() + self.operation_timeout;
        let work = self.attempt(
            IsolationLevel::RepeatableRead,
            AccessMode::ReadOnly,
            deadline,
            &mut body,
        );
        match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => tag_timeout(operation, result),
            Err(_) => Err(AppError::Timeout(operation)),
        }
    }

    /// Run an idempotency-keyed body.
    ///
    /// Inside each attempt the key is claimed first. A key already COMPLETED
    /// short-circuits to the stored payload; otherwise `body` runs and the key is
    /// marked COMPLETED with its result before commit. Any failure rolls the
    /// claim back together with the business mutation.
    pub async fn run_idempotent<T, F>(
        &self,
        operation: &'static str,
        isolation: IsolationLevel,
        request: IdempotencyRequest,
        body: F,
    ) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: for<'c> Fn(&'c mut PgConnection) -> TxBody<'c, T> + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        let key_ttl = self.key_ttl;

        self.run(operation, isolation, move |conn| {
            let body = Arc::clone(&body);
            let request = request.clone();
            Box::pin(async move {
                let (record, already_completed) =
                    idempotency::claim_or_fetch(&mut *conn, &request, key_ttl).await?;

                if already_completed {
                    tracing::info!(
                        operation = operation,
                        idempotency_key = %request.key,
                        scope = %request.scope,
                        "Idempotent replay, returning stored response"
                    );
                    return idempotency::replay::<T>(&record);
                }

                let value = (*body)(&mut *conn).await?;
                idempotency::mark_complete(&mut *conn, &request, &value).await?;
                Ok(value)
            })
        })
        .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn run_with_retries<T, F>(
        &self,
        operation: &'static str,
        isolation: IsolationLevel,
        deadline: Instant,
        body: &mut F,
    ) -> AppResult<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut PgConnection) -> TxBody<'c, T> + Send,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.attempt(isolation, AccessMode::ReadWrite, deadline, body).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.policy.decide(attempt, &err) {
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        operation = operation,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts(),
                        backoff_ms = delay.as_millis() as u64,
                        "Serialization conflict, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Exhausted => {
                    return Err(AppError::RetriesExhausted {
                        operation,
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                RetryDecision::Fail => return Err(err),
            }
        }
    }

    async fn attempt<T, F>(
        &self,
        isolation: IsolationLevel,
        mode: AccessMode,
        deadline: Instant,
        body: &mut F,
    ) -> AppResult<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut PgConnection) -> TxBody<'c, T> + Send,
    {
        let mut tx = self.pool.begin().await?;
        sqlx::query(isolation.set_transaction_sql(mode))
            .execute(&mut *tx)
            .await?;

        // A lock wait in the store must end with the operation deadline, not
        // with whoever holds the lock
        let remaining = deadline.saturating_duration_since(Instant::now());
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(lock_timeout_setting(remaining))
            .execute(&mut *tx)
            .await?;

        match body(&mut *tx).await {
            Ok(value) => {
                // A serialization failure can also surface here
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}

/// Store-side timeouts carry no operation name; attach the caller's.
fn tag_timeout<T>(operation: &'static str, result: AppResult<T>) -> AppResult<T> {
    match result {
        Err(AppError::Timeout(_)) => {
            tracing::warn!(operation = operation, "Store lock wait exceeded deadline, rolled back");
            Err(AppError::Timeout(operation))
        }
        other => other,
    }
}

/// `lock_timeout` value for the time left; never 0, which would disable it.
fn lock_timeout_setting(remaining: Duration) -> String {
    format!("{}ms", remaining.as_millis().max(1))
}
