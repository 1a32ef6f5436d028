//! Ledger transaction rows.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::{LedgerTransaction, NewTransaction, TransactionStatus};
use crate::error::{AppError, AppResult};

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    account_id: Uuid,
    amount: i64,
    transaction_type: String,
    status: String,
    transfer_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for LedgerTransaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            transaction_id: row.id,
            account_id: row.account_id,
            amount: row.amount,
            transaction_type: row.transaction_type.parse()?,
            status: row.status.parse()?,
            transfer_id: row.transfer_id,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_transaction(
    conn: &mut PgConnection,
    new: &NewTransaction,
    status: TransactionStatus,
) -> AppResult<LedgerTransaction> {
    let row: TransactionRow = sqlx::query_as(
        r#"
        INSERT INTO transactions (id, account_id, amount, transaction_type, status, transfer_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, account_id, amount, transaction_type, status, transfer_id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.account_id)
    .bind(new.amount)
    .bind(new.transaction_type.as_str())
    .bind(status.as_str())
    .bind(new.transfer_id)
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

pub async fn list_by_account(
    conn: &mut PgConnection,
    account_id: Uuid,
) -> AppResult<Vec<LedgerTransaction>> {
    let rows: Vec<TransactionRow> = sqlx::query_as(
        r#"
        SELECT id, account_id, amount, transaction_type, status, transfer_id, created_at
        FROM transactions
        WHERE account_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(account_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(LedgerTransaction::try_from).collect()
}

pub async fn find_by_id(
    conn: &mut PgConnection,
    transaction_id: Uuid,
) -> AppResult<Option<LedgerTransaction>> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
        SELECT id, account_id, amount, transaction_type, status, transfer_id, created_at
        FROM transactions
        WHERE id = $1
        "#,
    )
    .bind(transaction_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(LedgerTransaction::try_from).transpose()
}
