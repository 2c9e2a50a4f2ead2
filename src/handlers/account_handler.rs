//! Account Handler
//!
//! Registration, the caller's own account, receiver verification and the
//! caller's ledger history.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Account, AccountId, DomainError, LedgerEntry, OperationContext};
use crate::error::AppError;
use crate::store::WalletStore;

use super::{AccountSummary, RegisterAccountCommand, VerifyAccountCommand};

/// Caller identity or `Unauthenticated`
pub(crate) fn require_caller(context: &OperationContext) -> Result<&AccountId, AppError> {
    context.caller.as_ref().ok_or(AppError::Unauthenticated)
}

/// Handler for account reads and registration
pub struct AccountHandler {
    store: Arc<dyn WalletStore>,
}

impl AccountHandler {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    /// Register the caller with a zero balance
    pub async fn register(
        &self,
        command: RegisterAccountCommand,
        context: &OperationContext,
    ) -> Result<Account, AppError> {
        let caller = require_caller(context)?;

        let name = command.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name must not be empty").into());
        }

        let account = Account::register(caller.clone(), name);
        self.store.create_account(&account).await?;

        tracing::info!(
            account = %account.id,
            correlation_id = ?context.correlation_id,
            client_ip = ?context.client_ip,
            "Account registered"
        );
        Ok(account)
    }

    /// The caller's account including balance
    pub async fn me(&self, context: &OperationContext) -> Result<Account, AppError> {
        let caller = require_caller(context)?;
        self.store
            .find_by_identity(caller)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(caller.to_string()).into())
    }

    /// Confirm a receiver exists and return its display name
    pub async fn verify_account(
        &self,
        command: VerifyAccountCommand,
        context: &OperationContext,
    ) -> Result<AccountSummary, AppError> {
        require_caller(context)?;
        let identity = AccountId::parse(&command.identity)?;

        let account = self
            .store
            .find_by_identity(&identity)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(identity.to_string()))?;

        Ok(AccountSummary::from(&account))
    }

    /// Every entry the caller sent or received, newest first
    pub async fn list_transactions(
        &self,
        context: &OperationContext,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let caller = require_caller(context)?;
        Ok(self.store.list_for_account(caller).await?)
    }

    /// A single entry; only its sender or receiver may see it
    pub async fn get_transaction(
        &self,
        entry_id: Uuid,
        context: &OperationContext,
    ) -> Result<LedgerEntry, AppError> {
        let caller = require_caller(context)?;
        let entry = self
            .store
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| DomainError::EntryNotFound(entry_id.to_string()))?;

        if !entry.involves(caller) {
            return Err(AppError::Forbidden(
                "caller is not a party to this entry".to_string(),
            ));
        }
        Ok(entry)
    }
}
