//! Security collaborators
//!
//! Password hashing and token issuing, used by the auth service as opaque
//! primitives. Failures here are internal errors.

mod password;
mod tokens;

pub use password::{Argon2PasswordHasher, PasswordHasher};
pub use tokens::{hash_refresh_token, AccessClaims, TokenIssuer};
