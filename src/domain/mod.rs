//! Domain module
//!
//! Core domain types and validation rules.

pub mod account;
pub mod context;
pub mod error;
pub mod transaction;
pub mod user;

pub use account::{Account, AccountNumberSource, RandomAccountNumbers};
pub use context::OperationContext;
pub use error::DomainError;
pub use transaction::{LedgerTransaction, NewTransaction, TransactionStatus, TransactionType};
pub use user::{AccessToken, LoginResult, RefreshTokenRecord, User, UserProfile};
