//! Provider Errors
//!
//! Error types for payment provider calls.

use crate::domain::ProviderKind;

/// Errors that can occur while talking to a payment provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Webhook authenticity could not be established
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Authenticated webhook whose body we cannot use; redelivery will not fix it
    #[error("Malformed webhook body: {0}")]
    MalformedWebhook(String),

    /// Provider has no credentials configured
    #[error("Payment provider not configured: {0}")]
    NotConfigured(ProviderKind),

    /// Provider did not answer within the configured timeout
    #[error("Payment provider timed out")]
    Timeout,

    /// Transport-level failure
    #[error("Payment provider request failed: {0}")]
    Http(reqwest::Error),

    /// Provider answered with a non-success HTTP status
    #[error("Payment provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Provider answered with a body we could not interpret
    #[error("Unexpected payment provider response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::UnexpectedResponse(err.to_string())
        } else {
            ProviderError::Http(err)
        }
    }
}

impl ProviderError {
    /// Check if the failure is on the provider side (retry may help)
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout
                | ProviderError::Http(_)
                | ProviderError::Rejected { .. }
                | ProviderError::UnexpectedResponse(_)
        )
    }
}
