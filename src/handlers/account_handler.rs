//! Account Service
//!
//! Account and ledger operations. Mutations run through the retrying
//! executor with an idempotency claim; reads check ownership.

use std::sync::Arc;

use uuid::Uuid;

use crate::cache::AccountCache;
use crate::domain::{
    Account, AccountNumberSource, LedgerTransaction, NewTransaction, OperationContext,
    TransactionStatus,
};
use crate::error::{AppError, AppResult};
use crate::idempotency;
use crate::store::{accounts, transactions};
use crate::txn::{IsolationLevel, TransactionExecutor};

use super::{
    idempotency_request, require_requester, CreateAccountCommand, CreateTransactionCommand,
    DeleteAccountResult, TransactionReceipt,
};

/// Scope prefix of account service idempotency keys
pub const ACCOUNT_SERVICE_SCOPE: &str = "account";

#[derive(Clone)]
pub struct AccountService {
    executor: TransactionExecutor,
    cache: Arc<dyn AccountCache>,
    numbers: Arc<dyn AccountNumberSource>,
}

impl AccountService {
    pub fn new(
        executor: TransactionExecutor,
        cache: Arc<dyn AccountCache>,
        numbers: Arc<dyn AccountNumberSource>,
    ) -> Self {
        Self {
            executor,
            cache,
            numbers,
        }
    }

    pub fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Open an account for the requester.
    ///
    /// An account number collision is reported as `AlreadyExists` and is not
    /// retried with a fresh number.
    pub async fn create_account(
        &self,
        command: CreateAccountCommand,
        context: &OperationContext,
    ) -> AppResult<Account> {
        let requester = require_requester(context)?;
        if requester != command.owner_id {
            tracing::warn!(
                requester = %requester,
                owner_id = %command.owner_id,
                "Account creation for another user rejected"
            );
            return Err(AppError::NotAuthorized);
        }
        if command.initial_balance < 0 {
            return Err(AppError::InvalidArgument(
                "initial balance must not be negative".to_string(),
            ));
        }

        let request = idempotency_request(context, ACCOUNT_SERVICE_SCOPE, Some(requester))?;
        let numbers = Arc::clone(&self.numbers);
        let owner_id = command.owner_id;
        let initial_balance = command.initial_balance;

        let account = self
            .executor
            .run_idempotent(
                "create_account",
                IsolationLevel::ReadCommitted,
                request,
                move |conn| {
                    let numbers = Arc::clone(&numbers);
                    Box::pin(async move {
                        let account_number = numbers.next_number();
                        accounts::insert_account(conn, owner_id, account_number, initial_balance)
                            .await
                    })
                },
            )
            .await?;

        tracing::info!(
            account_id = %account.account_id,
            user_id = %account.user_id,
            correlation_id = ?context.correlation_id,
            "Account created"
        );

        Ok(account)
    }

    /// Append a ledger entry and apply its signed amount to the balance.
    pub async fn create_transaction(
        &self,
        command: CreateTransactionCommand,
        context: &OperationContext,
    ) -> AppResult<TransactionReceipt> {
        let requester = require_requester(context)?;
        let new = NewTransaction::new(
            command.account_id,
            command.amount,
            command.transaction_type,
            command.transfer_id,
        )?;
        let request = idempotency_request(context, ACCOUNT_SERVICE_SCOPE, Some(requester))?;

        let receipt = self
            .executor
            .run_idempotent(
                "create_transaction",
                IsolationLevel::ReadCommitted,
                request,
                move |conn| {
                    let new = new.clone();
                    Box::pin(async move {
                        let account = accounts::find_by_id_for_update(&mut *conn, new.account_id)
                            .await?
                            .ok_or_else(|| account_not_found(new.account_id))?;
                        ensure_owner(&account, requester)?;

                        let transaction = transactions::insert_transaction(
                            &mut *conn,
                            &new,
                            TransactionStatus::Completed,
                        )
                        .await?;
                        let updated = accounts::add_to_balance(
                            &mut *conn,
                            account.account_number,
                            new.balance_delta(),
                        )
                        .await?;

                        Ok(TransactionReceipt {
                            transaction,
                            balance: updated.balance,
                        })
                    })
                },
            )
            .await?;

        self.invalidate_cached(receipt.transaction.account_id).await;

        tracing::info!(
            transaction_id = %receipt.transaction.transaction_id,
            account_id = %receipt.transaction.account_id,
            amount = receipt.transaction.amount,
            correlation_id = ?context.correlation_id,
            "Transaction recorded"
        );

        Ok(receipt)
    }

    /// Delete an account and, through the cascade, its transactions.
    ///
    /// SERIALIZABLE because the ownership check and the delete must not race.
    pub async fn delete_account_by_account_number(
        &self,
        account_number: i64,
        context: &OperationContext,
    ) -> AppResult<DeleteAccountResult> {
        let requester = require_requester(context)?;
        let request = idempotency_request(context, ACCOUNT_SERVICE_SCOPE, Some(requester))?;

        let result = self
            .executor
            .run_idempotent(
                "delete_account",
                IsolationLevel::Serializable,
                request,
                move |conn| {
                    Box::pin(async move {
                        let account = accounts::find_by_number(&mut *conn, account_number)
                            .await?
                            .ok_or_else(|| account_number_not_found(account_number))?;
                        ensure_owner(&account, requester)?;

                        if !accounts::delete_by_number(&mut *conn, account_number).await? {
                            return Err(account_number_not_found(account_number));
                        }

                        Ok(DeleteAccountResult {
                            account_id: account.account_id,
                            account_number,
                        })
                    })
                },
            )
            .await?;

        self.invalidate_cached(result.account_id).await;

        tracing::info!(
            account_id = %result.account_id,
            correlation_id = ?context.correlation_id,
            "Account deleted"
        );

        Ok(result)
    }

    /// Internal cleanup of one idempotency key row. Not exposed to end users.
    pub async fn delete_idempotency_key(&self, key: &str, scope: &str) -> AppResult<bool> {
        let key = key.to_string();
        let scope = scope.to_string();

        self.executor
            .run(
                "delete_idempotency_key",
                IsolationLevel::Serializable,
                move |conn| {
                    let key = key.clone();
                    let scope = scope.clone();
                    Box::pin(async move { idempotency::delete_key(conn, &key, &scope).await })
                },
            )
            .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Single-account read through the cache.
    pub async fn get_account(
        &self,
        account_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Account> {
        let requester = require_requester(context)?;

        let account = match self.cache.get(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => self.load_and_cache(account_id).await?,
            Err(e) => {
                tracing::warn!(account_id = %account_id, "Account cache read failed: {}", e);
                self.load_and_cache(account_id).await?
            }
        };

        ensure_owner(&account, requester)?;
        Ok(account)
    }

    pub async fn get_account_by_account_number(
        &self,
        account_number: i64,
        context: &OperationContext,
    ) -> AppResult<Account> {
        let requester = require_requester(context)?;
        let mut conn = self.executor.pool().acquire().await?;

        let account = accounts::find_by_number(&mut *conn, account_number)
            .await?
            .ok_or_else(|| account_number_not_found(account_number))?;
        ensure_owner(&account, requester)?;

        Ok(account)
    }

    pub async fn get_accounts_by_user_id(
        &self,
        user_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Vec<Account>> {
        let requester = require_requester(context)?;
        if requester != user_id {
            tracing::warn!(requester = %requester, user_id = %user_id, "Account listing for another user rejected");
            return Err(AppError::NotAuthorized);
        }

        let mut conn = self.executor.pool().acquire().await?;
        accounts::list_by_user(&mut *conn, user_id).await
    }

    /// Ownership check and listing from one REPEATABLE READ snapshot.
    pub async fn get_transactions_by_account_id(
        &self,
        account_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Vec<LedgerTransaction>> {
        let requester = require_requester(context)?;

        self.executor
            .read_snapshot("get_transactions_by_account_id", move |conn| {
                Box::pin(async move {
                    let account = accounts::find_by_id(&mut *conn, account_id)
                        .await?
                        .ok_or_else(|| account_not_found(account_id))?;
                    ensure_owner(&account, requester)?;

                    transactions::list_by_account(&mut *conn, account_id).await
                })
            })
            .await
    }

    pub async fn get_transaction_by_id(
        &self,
        transaction_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<LedgerTransaction> {
        let requester = require_requester(context)?;

        self.executor
            .read_snapshot("get_transaction_by_id", move |conn| {
                Box::pin(async move {
                    let transaction = transactions::find_by_id(&mut *conn, transaction_id)
                        .await?
                        .ok_or_else(|| {
                            AppError::NotFound(format!("transaction {}", transaction_id))
                        })?;
                    let account = accounts::find_by_id(&mut *conn, transaction.account_id)
                        .await?
                        .ok_or_else(|| account_not_found(transaction.account_id))?;
                    ensure_owner(&account, requester)?;

                    Ok(transaction)
                })
            })
            .await
    }

    /// True iff the account exists and belongs to the requester.
    pub async fn validate_account_number(
        &self,
        account_number: i64,
        context: &OperationContext,
    ) -> AppResult<bool> {
        let requester = require_requester(context)?;
        let mut conn = self.executor.pool().acquire().await?;

        let account = accounts::find_by_number(&mut *conn, account_number).await?;
        Ok(account.map_or(false, |account| account.is_owned_by(requester)))
    }

    pub async fn has_sufficient_balance(
        &self,
        account_number: i64,
        amount: i64,
        context: &OperationContext,
    ) -> AppResult<bool> {
        let requester = require_requester(context)?;
        if amount < 0 {
            return Err(AppError::InvalidArgument(
                "amount must not be negative".to_string(),
            ));
        }

        let mut conn = self.executor.pool().acquire().await?;
        let account = accounts::find_by_number(&mut *conn, account_number)
            .await?
            .ok_or_else(|| account_number_not_found(account_number))?;
        ensure_owner(&account, requester)?;

        Ok(account.has_at_least(amount))
    }

    // =========================================================================
    // Cache plumbing
    // =========================================================================

    async fn load_and_cache(&self, account_id: Uuid) -> AppResult<Account> {
        let mut conn = self.executor.pool().acquire().await?;
        let account = accounts::find_by_id(&mut *conn, account_id)
            .await?
            .ok_or_else(|| account_not_found(account_id))?;

        if let Err(e) = self.cache.set(&account).await {
            tracing::warn!(account_id = %account_id, "Account cache write failed: {}", e);
        }

        Ok(account)
    }

    /// Best-effort, after commit.
    async fn invalidate_cached(&self, account_id: Uuid) {
        if let Err(e) = self.cache.invalidate(account_id).await {
            tracing::warn!(account_id = %account_id, "Account cache invalidation failed: {}", e);
        }
    }
}

fn ensure_owner(account: &Account, requester: Uuid) -> AppResult<()> {
    if account.is_owned_by(requester) {
        return Ok(());
    }
    tracing::warn!(
        account_id = %account.account_id,
        requester = %requester,
        "Access to account owned by another user rejected"
    );
    Err(AppError::NotAuthorized)
}

fn account_not_found(account_id: Uuid) -> AppError {
    AppError::NotFound(format!("account {}", account_id))
}

fn account_number_not_found(account_number: i64) -> AppError {
    AppError::NotFound(format!("account number {}", account_number))
}
