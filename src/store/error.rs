//! Store Errors
//!
//! Error types for account and ledger persistence.

use crate::domain::DomainError;

/// Errors that can occur in the wallet store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Business rule enforced at the storage boundary (missing account,
    /// insufficient funds, duplicate registration)
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row could not be mapped back to domain types
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The unit of work could not be completed; nothing was applied
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Check if the caller may safely retry (nothing took effect)
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Persistence(_))
    }

    /// Map Postgres constraint violations onto domain errors
    pub(crate) fn from_constraint(err: sqlx::Error, conflict: DomainError, missing: DomainError) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned());

        match code.as_deref() {
            // unique_violation
            Some("23505") => StoreError::Domain(conflict),
            // foreign_key_violation
            Some("23503") => StoreError::Domain(missing),
            _ => StoreError::Database(err),
        }
    }
}
