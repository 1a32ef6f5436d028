//! Ledger Service Library
//!
//! Idempotent, retrying, isolation-aware transaction core shared by the account
//! and auth services, plus the HTTP surface built on it.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod jobs;
pub mod security;
pub mod store;
pub mod txn;

pub use config::Config;
pub use domain::{Account, DomainError, LedgerTransaction, OperationContext, TransactionType};
pub use error::{AppError, AppResult};
pub use txn::{IsolationLevel, RetryPolicy, TransactionExecutor};
