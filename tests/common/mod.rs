//! Common test utilities
//!
//! Database-backed tests skip themselves when `DATABASE_URL` is unset. Tests
//! never truncate tables; every case works on fresh UUIDs and keys.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgConnection, PgPool};
use uuid::Uuid;

use ledger_service::cache::LocalAccountCache;
use ledger_service::domain::{OperationContext, RandomAccountNumbers};
use ledger_service::handlers::{AccountService, AuthService};
use ledger_service::security::{Argon2PasswordHasher, TokenIssuer};
use ledger_service::txn::{RetryPolicy, TransactionExecutor};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Serializes concurrent schema application across test binaries
const SCHEMA_LOCK_ID: i64 = 0x1ed6_e75e;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";

/// Connect and make sure the schema exists, or `None` when no database is configured
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping database test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    apply_schema(&pool).await;
    Some(pool)
}

async fn apply_schema(pool: &PgPool) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let conn: &mut PgConnection = &mut conn;

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(SCHEMA_LOCK_ID)
        .execute(&mut *conn)
        .await
        .expect("Failed to take schema lock");

    let applied = (&mut *conn).execute(SCHEMA).await;

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(SCHEMA_LOCK_ID)
        .execute(&mut *conn)
        .await
        .expect("Failed to release schema lock");

    applied.expect("Failed to apply schema");
}

/// Executor with fast retries so tests stay quick
pub fn executor(pool: &PgPool) -> TransactionExecutor {
    TransactionExecutor::new(pool.clone(), RetryPolicy::new(5, Duration::from_millis(5)))
        .with_operation_timeout(Duration::from_secs(30))
}

pub fn account_service(pool: &PgPool) -> AccountService {
    AccountService::new(
        executor(pool),
        Arc::new(LocalAccountCache::new(Duration::from_secs(5))),
        Arc::new(RandomAccountNumbers),
    )
}

pub fn token_issuer() -> TokenIssuer {
    TokenIssuer::new(
        TEST_JWT_SECRET,
        Duration::from_secs(900),
        Duration::from_secs(3600),
    )
}

pub fn auth_service(pool: &PgPool) -> AuthService {
    AuthService::new(executor(pool), Arc::new(Argon2PasswordHasher), token_issuer())
}

/// Unique idempotency key
pub fn new_key(label: &str) -> String {
    format!("{}-{}", label, Uuid::new_v4())
}

pub fn unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4().simple())
}

pub fn context(user_id: Uuid, key: &str) -> OperationContext {
    OperationContext::new()
        .with_request_user(user_id)
        .with_idempotency_key(key)
}

pub fn read_context(user_id: Uuid) -> OperationContext {
    OperationContext::new().with_request_user(user_id)
}

pub async fn count_transactions(pool: &PgPool, account_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count transactions")
}

pub async fn key_exists(pool: &PgPool, key: &str) -> bool {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM idempotency_keys WHERE key_id = $1)")
        .bind(key)
        .fetch_one(pool)
        .await
        .expect("Failed to look up idempotency key")
}
