//! User and refresh token rows.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{RefreshTokenRecord, User};
use crate::error::AppResult;

const USER_COLUMNS: &str = "id AS user_id, email, password_hash, created_at";

pub async fn insert_user(
    conn: &mut PgConnection,
    email: &str,
    password_hash: &str,
) -> AppResult<User> {
    let user: User = sqlx::query_as(&format!(
        r#"
        INSERT INTO users (id, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .fetch_one(&mut *conn)
    .await?;

    Ok(user)
}

pub async fn find_by_email(conn: &mut PgConnection, email: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(user)
}

pub async fn find_by_id(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<User>> {
    let user = sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(user)
}

/// Delete a user; refresh tokens cascade.
pub async fn delete_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<bool> {
    let rows = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(rows > 0)
}

pub async fn insert_refresh_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<RefreshTokenRecord> {
    let record = sqlx::query_as(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, token_hash, expires_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(record)
}

pub async fn find_refresh_token(
    conn: &mut PgConnection,
    token_hash: &str,
) -> AppResult<Option<RefreshTokenRecord>> {
    let record = sqlx::query_as(
        "SELECT id, user_id, token_hash, expires_at FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(record)
}

pub async fn delete_expired_refresh_tokens(pool: &PgPool) -> AppResult<u64> {
    let rows = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
        .execute(pool)
        .await?
        .rows_affected();

    Ok(rows)
}
