//! Command Handlers module
//!
//! Business operations of the account and auth services, each composed from
//! the idempotency key manager and the retrying transaction executor.

mod account_handler;
mod auth_handler;
mod commands;

#[cfg(test)]
mod tests;

pub use account_handler::{AccountService, ACCOUNT_SERVICE_SCOPE};
pub use auth_handler::{AuthService, AUTH_SERVICE_SCOPE};
pub use commands::*;

use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::{AppError, AppResult};
use crate::idempotency::IdempotencyRequest;

pub const REQUEST_USER_HEADER: &str = "X-Request-User-Id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Requester id, validated upstream and carried in the context.
pub(crate) fn require_requester(context: &OperationContext) -> AppResult<Uuid> {
    context
        .request_user_id
        .ok_or_else(|| AppError::MissingHeader(REQUEST_USER_HEADER.to_string()))
}

/// Client key from the context, bound to `service` and `principal`.
pub(crate) fn idempotency_request(
    context: &OperationContext,
    service: &str,
    principal: Option<Uuid>,
) -> AppResult<IdempotencyRequest> {
    let key = context
        .idempotency_key
        .as_deref()
        .ok_or_else(|| AppError::MissingHeader(IDEMPOTENCY_KEY_HEADER.to_string()))?;

    IdempotencyRequest::new(key, service, principal)
}
