//! Command definitions
//!
//! Commands carry the client's intent; results are what an operation returns
//! and what a completed idempotency key stores for replay.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{LedgerTransaction, TransactionType};

// =========================================================================
// Account commands
// =========================================================================

/// Command to open an account for `owner_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub owner_id: Uuid,
    #[serde(default)]
    pub initial_balance: i64,
}

impl CreateAccountCommand {
    pub fn new(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            initial_balance: 0,
        }
    }

    pub fn with_initial_balance(mut self, initial_balance: i64) -> Self {
        self.initial_balance = initial_balance;
        self
    }
}

/// Command to append a ledger entry and apply its balance delta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionCommand {
    pub account_id: Uuid,
    /// Signed amount: credits positive, debits negative
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub transfer_id: Option<Uuid>,
}

impl CreateTransactionCommand {
    pub fn new(account_id: Uuid, amount: i64, transaction_type: TransactionType) -> Self {
        Self {
            account_id,
            amount,
            transaction_type,
            transfer_id: None,
        }
    }

    /// Deposit for positive amounts, withdrawal otherwise
    pub fn adjustment(account_id: Uuid, amount: i64) -> Self {
        let transaction_type = if amount > 0 {
            TransactionType::Deposit
        } else {
            TransactionType::Withdrawal
        };
        Self::new(account_id, amount, transaction_type)
    }

    pub fn with_transfer_id(mut self, transfer_id: Uuid) -> Self {
        self.transfer_id = Some(transfer_id);
        self
    }
}

/// Ledger entry together with the balance right after it was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction: LedgerTransaction,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAccountResult {
    pub account_id: Uuid,
    pub account_number: i64,
}

// =========================================================================
// Auth commands
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserCommand {
    pub email: String,
    pub password: String,
}

impl CreateUserCommand {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCommand {
    pub email: String,
    pub password: String,
}

impl LoginCommand {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewAccessTokenCommand {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteUserResult {
    pub user_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_account_command_defaults() {
        let owner = Uuid::new_v4();
        let cmd = CreateAccountCommand::new(owner);
        assert_eq!(cmd.owner_id, owner);
        assert_eq!(cmd.initial_balance, 0);
        assert_eq!(cmd.with_initial_balance(250).initial_balance, 250);
    }

    #[test]
    fn test_create_account_command_json_default_balance() {
        let owner = Uuid::new_v4();
        let cmd: CreateAccountCommand =
            serde_json::from_value(serde_json::json!({ "owner_id": owner })).unwrap();
        assert_eq!(cmd.initial_balance, 0);
    }

    #[test]
    fn test_adjustment_picks_type_from_sign() {
        let account_id = Uuid::new_v4();
        assert_eq!(
            CreateTransactionCommand::adjustment(account_id, 500).transaction_type,
            TransactionType::Deposit
        );
        assert_eq!(
            CreateTransactionCommand::adjustment(account_id, -500).transaction_type,
            TransactionType::Withdrawal
        );
    }

    #[test]
    fn test_transaction_command_json() {
        let account_id = Uuid::new_v4();
        let cmd: CreateTransactionCommand = serde_json::from_value(serde_json::json!({
            "account_id": account_id,
            "amount": -75,
            "transaction_type": "TRANSFER_DEBIT",
            "transfer_id": null
        }))
        .unwrap();
        assert_eq!(cmd.transaction_type, TransactionType::TransferDebit);
        assert_eq!(cmd.amount, -75);
        assert!(cmd.transfer_id.is_none());
    }
}
