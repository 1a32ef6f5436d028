//! Ledger transactions
//!
//! Immutable records of balance-affecting events on an account.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

/// Kind of ledger entry. Credits carry positive amounts, debits negative ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    TransferCredit,
    TransferDebit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::TransferCredit => "TRANSFER_CREDIT",
            TransactionType::TransferDebit => "TRANSFER_DEBIT",
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::TransferCredit)
    }

    pub fn is_transfer_leg(&self) -> bool {
        matches!(
            self,
            TransactionType::TransferCredit | TransactionType::TransferDebit
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            "TRANSFER_CREDIT" => Ok(TransactionType::TransferCredit),
            "TRANSFER_DEBIT" => Ok(TransactionType::TransferDebit),
            other => Err(DomainError::UnknownTransactionType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(DomainError::UnknownTransactionStatus(other.to_string())),
        }
    }
}

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    /// Links the two legs of a transfer
    pub transfer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Validated request to append a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub account_id: Uuid,
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub transfer_id: Option<Uuid>,
}

impl NewTransaction {
    /// Validate amount sign and transfer link against the type.
    pub fn new(
        account_id: Uuid,
        amount: i64,
        transaction_type: TransactionType,
        transfer_id: Option<Uuid>,
    ) -> Result<Self, DomainError> {
        if amount == 0 {
            return Err(DomainError::InvalidAmount("amount must not be zero".to_string()));
        }
        if transaction_type.is_credit() && amount < 0 {
            return Err(DomainError::InvalidAmount(format!(
                "{} requires a positive amount",
                transaction_type
            )));
        }
        if !transaction_type.is_credit() && amount > 0 {
            return Err(DomainError::InvalidAmount(format!(
                "{} requires a negative amount",
                transaction_type
            )));
        }
        if transaction_type.is_transfer_leg() != transfer_id.is_some() {
            return Err(DomainError::InvalidTransferLink(transaction_type.to_string()));
        }

        Ok(Self {
            account_id,
            amount,
            transaction_type,
            transfer_id,
        })
    }

    /// Balance delta applied together with this entry.
    pub fn balance_delta(&self) -> i64 {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_amount_rejected() {
        let result = NewTransaction::new(Uuid::new_v4(), 0, TransactionType::Deposit, None);
        assert!(matches!(result, Err(DomainError::InvalidAmount(_))));
    }

    #[test]
    fn test_sign_must_match_type() {
        let account_id = Uuid::new_v4();
        assert!(NewTransaction::new(account_id, 500, TransactionType::Deposit, None).is_ok());
        assert!(NewTransaction::new(account_id, -500, TransactionType::Withdrawal, None).is_ok());
        assert!(NewTransaction::new(account_id, -500, TransactionType::Deposit, None).is_err());
        assert!(NewTransaction::new(account_id, 500, TransactionType::Withdrawal, None).is_err());
        assert!(NewTransaction::new(account_id, 10, TransactionType::TransferDebit, None).is_err());
    }

    #[test]
    fn test_transfer_id_only_on_transfer_legs() {
        let account_id = Uuid::new_v4();
        let transfer_id = Some(Uuid::new_v4());
        assert!(matches!(
            NewTransaction::new(account_id, 10, TransactionType::TransferCredit, None),
            Err(DomainError::InvalidTransferLink(_))
        ));
        assert!(matches!(
            NewTransaction::new(account_id, 10, TransactionType::Deposit, transfer_id),
            Err(DomainError::InvalidTransferLink(_))
        ));
        assert!(NewTransaction::new(account_id, 10, TransactionType::TransferCredit, transfer_id).is_ok());
    }

    #[test]
    fn test_balance_delta_is_signed_amount() {
        let debit =
            NewTransaction::new(Uuid::new_v4(), -75, TransactionType::TransferDebit, Some(Uuid::new_v4()))
                .unwrap();
        assert_eq!(debit.balance_delta(), -75);
    }

    #[test]
    fn test_transaction_type_tags() {
        for ty in [
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::TransferCredit,
            TransactionType::TransferDebit,
        ] {
            assert_eq!(ty.as_str().parse::<TransactionType>().unwrap(), ty);
            assert_eq!(serde_json::to_value(ty).unwrap(), ty.as_str());
        }
        assert!("REFUND".parse::<TransactionType>().is_err());
        assert!(TransactionType::TransferDebit.is_transfer_leg());
        assert!(!TransactionType::Deposit.is_transfer_leg());
    }

    #[test]
    fn test_transaction_status_tags() {
        assert_eq!("COMPLETED".parse::<TransactionStatus>().unwrap(), TransactionStatus::Completed);
        assert_eq!(TransactionStatus::Pending.to_string(), "PENDING");
        assert!("DONE".parse::<TransactionStatus>().is_err());
    }
}
