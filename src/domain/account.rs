//! Account
//!
//! A balance-holding account owned by exactly one user.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Smallest generated account number.
pub const ACCOUNT_NUMBER_MIN: i64 = 1_000_000_000;

/// Largest generated account number.
pub const ACCOUNT_NUMBER_MAX: i64 = 1_000_000_000_000_000_000;

/// Account snapshot as stored, cached and returned to clients.
///
/// The balance is only ever changed by an atomic add-delta statement and the
/// account number is immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub account_number: i64,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn has_at_least(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

/// Source of externally shown account numbers.
///
/// Collisions surface as a unique violation on insert and are fatal for
/// the creating operation.
pub trait AccountNumberSource: Send + Sync {
    fn next_number(&self) -> i64;
}

/// Uniformly random account numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAccountNumbers;

impl AccountNumberSource for RandomAccountNumbers {
    fn next_number(&self) -> i64 {
        rand::thread_rng().gen_range(ACCOUNT_NUMBER_MIN..=ACCOUNT_NUMBER_MAX)
    }
}
