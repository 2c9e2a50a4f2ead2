//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::providers::ProviderError;
use crate::store::StoreError;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing authenticated identity")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Idempotency conflict: same key with different request")]
    IdempotencyConflict,

    #[error("Invalid webhook signature")]
    InvalidSignature(String),

    #[error("Payment could not be verified: {0}")]
    ProviderVerificationFailed(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(e) => AppError::Domain(e),
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Persistence(msg) => AppError::Persistence(msg),
            StoreError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidSignature(reason) => AppError::InvalidSignature(reason),
            ProviderError::MalformedWebhook(reason) => AppError::InvalidRequest(reason),
            other => AppError::ProviderUnavailable(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status, machine-readable code and optional details
    fn parts(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::InvalidSignature(_) => {
                // Reason stays in the logs; callers learn nothing about which check failed
                (StatusCode::BAD_REQUEST, "invalid_signature", None)
            }

            // 401 Unauthorized
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated", None),

            // 402 Payment Required
            AppError::ProviderVerificationFailed(msg) => (
                StatusCode::PAYMENT_REQUIRED,
                "provider_verification_failed",
                Some(msg.clone()),
            ),

            // 403 Forbidden
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),

            // 409 Conflict
            AppError::IdempotencyConflict => {
                (StatusCode::CONFLICT, "idempotency_conflict", None)
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => match domain_err {
                DomainError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
                }
                DomainError::InvalidAmount(e) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(e.to_string()))
                }
                DomainError::CurrencyMismatch { .. } => (
                    StatusCode::BAD_REQUEST,
                    "currency_mismatch",
                    Some(domain_err.to_string()),
                ),
                DomainError::InsufficientFunds { .. } => (
                    StatusCode::BAD_REQUEST,
                    "insufficient_funds",
                    Some(domain_err.to_string()),
                ),
                DomainError::SameAccountTransfer => {
                    (StatusCode::BAD_REQUEST, "same_account_transfer", None)
                }
                DomainError::AccountNotFound(id) => {
                    (StatusCode::NOT_FOUND, "account_not_found", Some(id.clone()))
                }
                DomainError::EntryNotFound(id) => {
                    (StatusCode::NOT_FOUND, "entry_not_found", Some(id.clone()))
                }
                DomainError::AccountAlreadyExists(id) => {
                    (StatusCode::CONFLICT, "account_already_exists", Some(id.clone()))
                }
            },

            // 502 Bad Gateway
            AppError::ProviderUnavailable(msg) => {
                tracing::error!("Payment provider error: {}", msg);
                (StatusCode::BAD_GATEWAY, "provider_unavailable", None)
            }

            // 500 Internal Server Error
            AppError::Persistence(msg) => {
                tracing::error!("Persistence failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        }
    }

    /// Status code this error is reported with
    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = self.parts();

        // Server-side failure text never leaves the process
        let error = if status.is_server_error() {
            match status {
                StatusCode::BAD_GATEWAY => "Payment provider unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
