//! Ledger Store statements
//!
//! Free functions over a borrowed connection so every statement runs inside
//! the store transaction the executor hands to an operation body.

pub mod accounts;
pub mod transactions;
pub mod users;
