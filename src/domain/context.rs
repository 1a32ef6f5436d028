//! Operation Context
//!
//! Per-request metadata handed from the HTTP layer to the services.

use uuid::Uuid;

/// Who is calling, under which idempotency key, and for which trace.
///
/// The requester id is authenticated by the gateway before it reaches this
/// service. Services only compare it against resource owners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    pub request_user_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<Uuid>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_user(mut self, user_id: Uuid) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Correlation id of this request, minted on first use.
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}
