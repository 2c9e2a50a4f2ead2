//! API Middleware
//!
//! Caller identity extraction and request logging.

use std::net::IpAddr;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{AccountId, OperationContext};

/// Header carrying the identity the upstream gateway authenticated
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";

/// Header carrying a caller-chosen correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// =========================================================================
// Operation Context Middleware
// =========================================================================

/// Build the [`OperationContext`] for every request.
///
/// Authentication happens upstream; this only trusts the gateway header. A
/// missing header is allowed here (webhooks and the checkout redirect carry
/// none) and rejected by handlers that need a caller. A malformed one is
/// rejected outright.
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Result<Response, Response> {
    let headers = request.headers();
    let mut context = OperationContext::new();

    if let Some(raw) = headers.get(AUTHENTICATED_USER_HEADER) {
        let caller = raw
            .to_str()
            .ok()
            .and_then(|value| AccountId::parse(value).ok());
        match caller {
            Some(caller) => context = context.with_caller(caller),
            None => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "error": "Invalid X-Authenticated-User header",
                        "error_code": "unauthenticated"
                    })),
                )
                    .into_response());
            }
        }
    }

    // Extract correlation ID or generate new one
    let correlation_id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    context = context.with_correlation_id(correlation_id);

    if let Some(ip) = client_ip(headers) {
        context = context.with_client_ip(ip);
    }

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// First hop of `X-Forwarded-For`, as set by the gateway
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "stripe-signature",
    "verif-hash",
    AUTHENTICATED_USER_HEADER,
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
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
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    // Mask sensitive headers
    let headers = mask_headers_for_logging(request.headers());

    let (correlation_id, client_ip) = request
        .extensions()
        .get::<OperationContext>()
        .map(|ctx| (ctx.correlation_id, ctx.client_ip))
        .unwrap_or_default();

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        client_ip = ?client_ip,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
