//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Validation and decoding failures of domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Zero amount, or sign that contradicts the transaction type
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Transfer legs carry a transfer id; other entries must not
    #[error("Transfer id does not match transaction type {0}")]
    InvalidTransferLink(String),

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password must be between {min} and {max} characters")]
    InvalidPassword { min: usize, max: usize },

    /// Stored transaction type tag that this build does not know
    #[error("Unknown transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("Unknown transaction status: {0}")]
    UnknownTransactionStatus(String),
}

impl DomainError {
    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::InvalidTransferLink(_)
                | Self::InvalidEmail
                | Self::InvalidPassword { .. }
        )
    }
}

impl From<DomainError> for crate::error::AppError {
    fn from(err: DomainError) -> Self {
        if err.is_client_error() {
            crate::error::AppError::InvalidArgument(err.to_string())
        } else {
            crate::error::AppError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_invalid_amount_is_invalid_argument() {
        let err: AppError = DomainError::InvalidAmount("amount must not be zero".to_string()).into();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_stored_tag_is_internal() {
        let err: AppError = DomainError::UnknownTransactionType("REFUND".to_string()).into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
