//! Checkout Handler
//!
//! Starts a deposit: makes sure the caller has a customer record at the
//! provider, then opens a hosted checkout for the requested amount.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::domain::{Account, DomainError, OperationContext, ProviderKind};
use crate::error::AppError;
use crate::providers::{CheckoutRequest, CheckoutSession, PaymentProvider, ProviderRegistry};
use crate::store::WalletStore;

use super::account_handler::require_caller;
use super::CheckoutCommand;

/// Handler for deposit checkout creation
pub struct CheckoutHandler {
    store: Arc<dyn WalletStore>,
    providers: ProviderRegistry,
    config: Arc<Config>,
}

impl CheckoutHandler {
    pub fn new(store: Arc<dyn WalletStore>, providers: ProviderRegistry, config: Arc<Config>) -> Self {
        Self {
            store,
            providers,
            config,
        }
    }

    pub async fn execute(
        &self,
        kind: ProviderKind,
        command: CheckoutCommand,
        context: &OperationContext,
    ) -> Result<CheckoutSession, AppError> {
        let caller = require_caller(context)?;
        let account = self
            .store
            .find_by_identity(caller)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(caller.to_string()))?;

        let provider = self.providers.get(kind)?;
        let customer_ref = self
            .get_or_create_provider_customer(&account, provider.as_ref())
            .await?;

        let success_url = match kind {
            ProviderKind::Stripe => self.config.deposit_success_url(),
            // Flutterwave lands on our callback, which verifies before redirecting on
            ProviderKind::Flutterwave => self.config.flutterwave_callback_url(),
        };

        let request = CheckoutRequest {
            account: account.id.clone(),
            account_name: account.name.clone(),
            customer_ref,
            amount: command.amount,
            currency: self.config.wallet_currency.clone(),
            reference: format!("wallet-{}", Uuid::new_v4()),
            success_url,
            cancel_url: self.config.deposit_failure_url(),
        };

        let session = provider.create_checkout_session(&request).await?;

        tracing::info!(
            provider = %kind,
            account = %account.id,
            amount = command.amount.minor_units(),
            session = %session.session_id,
            correlation_id = ?context.correlation_id,
            client_ip = ?context.client_ip,
            "Checkout session created"
        );
        Ok(session)
    }

    /// Stored provider customer id, creating one at the provider on first use.
    /// Concurrent first uses may both create a remote customer; only the first
    /// stored id is ever used.
    pub async fn get_or_create_provider_customer(
        &self,
        account: &Account,
        provider: &dyn PaymentProvider,
    ) -> Result<String, AppError> {
        let kind = provider.kind();
        if let Some(existing) = self.store.provider_customer(&account.id, kind).await? {
            return Ok(existing);
        }

        let created = provider.create_customer(account).await?;
        let stored = self
            .store
            .save_provider_customer(&account.id, kind, &created)
            .await?;

        if stored != created {
            tracing::debug!(
                provider = %kind,
                account = %account.id,
                "Provider customer created concurrently; keeping the stored one"
            );
        }
        Ok(stored)
    }
}
