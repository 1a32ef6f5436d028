//! Transaction execution
//!
//! Isolation levels, retry policy and the retrying transaction executor
//! shared by the account and auth services.

mod executor;
mod isolation;
mod retry;

pub use executor::{TransactionExecutor, TxBody};
pub use isolation::{AccessMode, IsolationLevel};
pub use retry::{RetryDecision, RetryPolicy};
