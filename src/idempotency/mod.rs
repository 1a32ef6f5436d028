//! Idempotency module
//!
//! Idempotency Key Manager: claims or fetches a key row inside an active store
//! transaction so retried or duplicated client calls apply at most once.

mod repository;

pub use repository::{
    claim_or_fetch, delete_expired, delete_key, mark_complete, replay, IdempotencyRecord,
    IdempotencyRequest, IdempotencyStatus, MAX_KEY_LEN,
};
