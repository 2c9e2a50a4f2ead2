//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::amount::AmountError;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Missing or malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid amount (zero, negative, too precise, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Insufficient balance for debit operation
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Ledger entry not found
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Account identity already registered
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    /// Transfer to same account
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    /// Provider amount is in a different currency than the wallet
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a client error (caller's fault, nothing was changed)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::AccountAlreadyExists(_))
    }
}
