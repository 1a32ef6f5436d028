//! Account rows.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::Account;
use crate::error::{AppError, AppResult};

const ACCOUNT_COLUMNS: &str = "id AS account_id, user_id, account_number, balance, created_at";

pub async fn insert_account(
    conn: &mut PgConnection,
    user_id: Uuid,
    account_number: i64,
    initial_balance: i64,
) -> AppResult<Account> {
    let account: Account = sqlx::query_as(&format!(
        r#"
        INSERT INTO accounts (id, user_id, account_number, balance)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        ACCOUNT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(account_number)
    .bind(initial_balance)
    .fetch_one(&mut *conn)
    .await?;

    Ok(account)
}

pub async fn find_by_id(conn: &mut PgConnection, account_id: Uuid) -> AppResult<Option<Account>> {
    let account = sqlx::query_as(&format!(
        "SELECT {} FROM accounts WHERE id = $1",
        ACCOUNT_COLUMNS
    ))
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

/// Like [`find_by_id`], but locks the row for a balance update.
///
/// Waits for an in-flight delete of the row and then sees it gone, so a
/// concurrent delete surfaces as a missing account instead of a foreign key
/// violation on the ledger insert. `NO KEY UPDATE` rather than `SHARE`: two
/// writers holding share locks would deadlock upgrading for the balance update.
pub async fn find_by_id_for_update(
    conn: &mut PgConnection,
    account_id: Uuid,
) -> AppResult<Option<Account>> {
    let account = sqlx::query_as(&format!(
        "SELECT {} FROM accounts WHERE id = $1 FOR NO KEY UPDATE",
        ACCOUNT_COLUMNS
    ))
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

pub async fn find_by_number(
    conn: &mut PgConnection,
    account_number: i64,
) -> AppResult<Option<Account>> {
    let account = sqlx::query_as(&format!(
        "SELECT {} FROM accounts WHERE account_number = $1",
        ACCOUNT_COLUMNS
    ))
    .bind(account_number)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(account)
}

pub async fn list_by_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<Account>> {
    let accounts = sqlx::query_as(&format!(
        "SELECT {} FROM accounts WHERE user_id = $1 ORDER BY created_at, id",
        ACCOUNT_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(accounts)
}

/// Atomically add `delta` (possibly negative) to the balance and return the updated row.
pub async fn add_to_balance(
    conn: &mut PgConnection,
    account_number: i64,
    delta: i64,
) -> AppResult<Account> {
    let account: Option<Account> = sqlx::query_as(&format!(
        r#"
        UPDATE accounts
        SET balance = balance + $1, updated_at = NOW()
        WHERE account_number = $2
        RETURNING {}
        "#,
        ACCOUNT_COLUMNS
    ))
    .bind(delta)
    .bind(account_number)
    .fetch_optional(&mut *conn)
    .await?;

    account.ok_or_else(|| AppError::NotFound(format!("account {}", account_number)))
}

/// Delete an account; its transactions go with it through the foreign key cascade.
pub async fn delete_by_number(conn: &mut PgConnection, account_number: i64) -> AppResult<bool> {
    let rows = sqlx::query("DELETE FROM accounts WHERE account_number = $1")
        .bind(account_number)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(rows > 0)
}
