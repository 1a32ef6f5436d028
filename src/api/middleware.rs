//! API Middleware
//!
//! Request context extraction and request logging.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;
use crate::handlers::{IDEMPOTENCY_KEY_HEADER, REQUEST_USER_HEADER};

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

// =========================================================================
// Request context
// =========================================================================

/// Build the `OperationContext` from headers set by the gateway and client.
///
/// The requester id is trusted as pre-validated upstream; only its format is
/// checked here. Handlers decide whether it is required.
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = match context_from_headers(request.headers()) {
        Ok(context) => context,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}

pub fn context_from_headers(headers: &HeaderMap) -> Result<OperationContext, AppError> {
    let mut context = OperationContext::new();

    if let Some(raw) = headers.get(REQUEST_USER_HEADER) {
        let user_id = raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("{} must be a UUID", REQUEST_USER_HEADER))
            })?;
        context = context.with_request_user(user_id);
    }

    if let Some(raw) = headers.get(IDEMPOTENCY_KEY_HEADER) {
        let key = raw.to_str().map_err(|_| {
            AppError::InvalidArgument(format!("{} must be visible ASCII", IDEMPOTENCY_KEY_HEADER))
        })?;
        context = context.with_idempotency_key(key);
    }

    // Malformed correlation ids are replaced rather than rejected
    if let Some(correlation_id) = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
    {
        context = context.with_correlation_id(correlation_id);
    }
    context.ensure_correlation_id();

    Ok(context)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-fingerprint"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked_value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
///
/// Runs inside `context_middleware`, so the correlation id is already known.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());
    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = start.elapsed().as_millis() as u64,
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
