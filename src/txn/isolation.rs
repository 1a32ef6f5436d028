//! Isolation levels requested per store transaction.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Single atomic statements and plain inserts.
    ReadCommitted,
    /// Consistent snapshot for multi-step reads.
    RepeatableRead,
    /// Read-then-act operations such as ownership check before delete.
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Statement issued first inside a freshly opened transaction.
    pub fn set_transaction_sql(&self, mode: AccessMode) -> &'static str {
        match (self, mode) {
            (IsolationLevel::ReadCommitted, AccessMode::ReadWrite) => {
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ WRITE"
            }
            (IsolationLevel::ReadCommitted, AccessMode::ReadOnly) => {
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ ONLY"
            }
            (IsolationLevel::RepeatableRead, AccessMode::ReadWrite) => {
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ WRITE"
            }
            (IsolationLevel::RepeatableRead, AccessMode::ReadOnly) => {
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY"
            }
            (IsolationLevel::Serializable, AccessMode::ReadWrite) => {
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE READ WRITE"
            }
            (IsolationLevel::Serializable, AccessMode::ReadOnly) => {
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE READ ONLY"
            }
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_transaction_sql() {
        assert_eq!(
            IsolationLevel::Serializable.set_transaction_sql(AccessMode::ReadWrite),
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE READ WRITE"
        );
        assert_eq!(
            IsolationLevel::RepeatableRead.set_transaction_sql(AccessMode::ReadOnly),
            "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY"
        );
        for level in [
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ] {
            assert!(level
                .set_transaction_sql(AccessMode::ReadWrite)
                .contains(level.as_sql()));
        }
    }
}
