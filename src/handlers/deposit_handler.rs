//! Deposit Handler
//!
//! Credits wallet accounts from provider-confirmed payments. Confirmations
//! arrive through signed webhooks or through the browser redirect after a
//! hosted checkout; both paths end in [`DepositHandler::reconcile`], which
//! credits each provider transaction at most once.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::domain::{
    AccountId, Amount, Currency, CustomerRef, DepositConfirmation, DomainError, NewLedgerEntry,
    ProviderKind, ProviderReference,
};
use crate::error::AppError;
use crate::providers::{ProviderRegistry, TransactionVerification, WebhookEvent};
use crate::store::{Claim, OperationKey, WalletStore};

use super::{DepositOutcome, FlutterwaveRedirect, WebhookOutcome};

/// Handler for deposit reconciliation
pub struct DepositHandler {
    store: Arc<dyn WalletStore>,
    providers: ProviderRegistry,
    wallet_currency: Currency,
}

impl DepositHandler {
    pub fn new(
        store: Arc<dyn WalletStore>,
        providers: ProviderRegistry,
        wallet_currency: Currency,
    ) -> Self {
        Self {
            store,
            providers,
            wallet_currency,
        }
    }

    /// Credit the account behind a provider confirmation, once per provider
    /// transaction.
    pub async fn reconcile(
        &self,
        confirmation: DepositConfirmation,
    ) -> Result<DepositOutcome, AppError> {
        let account = self.resolve_customer(&confirmation).await?;
        let amount = confirmation.gross.normalize(&self.wallet_currency)?;

        let operation = OperationKey::provider_transaction(
            confirmation.provider,
            &confirmation.provider_transaction_id,
            deposit_fingerprint(&account, amount),
        );
        let entry = NewLedgerEntry::deposit(
            account.clone(),
            amount,
            confirmation.description.clone(),
            ProviderReference {
                provider: confirmation.provider,
                transaction_id: confirmation.provider_transaction_id.clone(),
            },
        );

        let mut unit = self.store.begin().await?;

        let claim = unit.claim_operation(&operation, entry.id).await?;
        if let Claim::Existing {
            entry_id,
            fingerprint,
        } = claim
        {
            drop(unit);
            if fingerprint != operation.fingerprint {
                tracing::warn!(
                    provider = %confirmation.provider,
                    transaction = %confirmation.provider_transaction_id,
                    "Redelivered confirmation differs from the credited one"
                );
            }
            let original = self.store.find_entry(entry_id).await?.ok_or_else(|| {
                AppError::Internal(format!("claimed entry {entry_id} is missing"))
            })?;
            tracing::info!(
                provider = %confirmation.provider,
                transaction = %confirmation.provider_transaction_id,
                entry_id = %entry_id,
                "Deposit already credited"
            );
            return Ok(DepositOutcome {
                entry: original,
                newly_credited: false,
            });
        }

        let balance = unit.adjust_balance(&account, amount.minor_units()).await?;
        let recorded = unit.record(entry).await?;
        unit.commit().await?;

        tracing::info!(
            provider = %confirmation.provider,
            transaction = %confirmation.provider_transaction_id,
            account = %account,
            amount = amount.minor_units(),
            balance = balance.minor_units(),
            entry_id = %recorded.id,
            "Deposit credited"
        );

        Ok(DepositOutcome {
            entry: recorded,
            newly_credited: true,
        })
    }

    /// Authenticate a webhook delivery and reconcile what it confirms.
    /// Nothing is read from the payload before the provider check passes.
    pub async fn handle_webhook(
        &self,
        kind: ProviderKind,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        let provider = self.providers.get(kind)?;

        let event = match provider.verify_webhook(payload, signature) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(provider = %kind, error = %e, "Webhook rejected");
                return Err(e.into());
            }
        };

        match event {
            WebhookEvent::PaymentConfirmed(confirmation) => {
                Ok(WebhookOutcome::Credited(self.reconcile(confirmation).await?))
            }
            WebhookEvent::PaymentReported { transaction_ref } => {
                match provider.verify_transaction(&transaction_ref).await? {
                    TransactionVerification::Confirmed(confirmation) => {
                        Ok(WebhookOutcome::Credited(self.reconcile(confirmation).await?))
                    }
                    TransactionVerification::NotConfirmed { status } => {
                        tracing::warn!(
                            provider = %kind,
                            transaction = %transaction_ref,
                            status = %status,
                            "Webhook reported a payment the provider does not confirm"
                        );
                        Ok(WebhookOutcome::NotConfirmed { status })
                    }
                }
            }
            WebhookEvent::Ignored { event_type } => {
                tracing::debug!(provider = %kind, event_type = %event_type, "Webhook ignored");
                Ok(WebhookOutcome::Ignored { event_type })
            }
        }
    }

    /// Handle the browser returning from Flutterwave's hosted checkout.
    ///
    /// The query `status` only short-circuits the failure case; a claimed
    /// success is credited only if the provider itself confirms it.
    pub async fn handle_redirect(
        &self,
        redirect: FlutterwaveRedirect,
    ) -> Result<DepositOutcome, AppError> {
        let status = redirect.status.as_deref().unwrap_or_default();
        if status != "successful" {
            return Err(AppError::ProviderVerificationFailed(format!(
                "checkout returned status {status:?}"
            )));
        }

        let transaction_id = redirect
            .transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::ProviderVerificationFailed("redirect has no transaction_id".to_string())
            })?;

        let provider = self.providers.get(ProviderKind::Flutterwave)?;
        match provider.verify_transaction(transaction_id).await? {
            TransactionVerification::Confirmed(confirmation) => {
                self.reconcile(confirmation).await
            }
            TransactionVerification::NotConfirmed { status } => {
                tracing::warn!(
                    transaction = %transaction_id,
                    tx_ref = redirect.tx_ref.as_deref().unwrap_or("-"),
                    status = %status,
                    "Redirect claimed success but verification did not confirm"
                );
                Err(AppError::ProviderVerificationFailed(status))
            }
        }
    }

    async fn resolve_customer(
        &self,
        confirmation: &DepositConfirmation,
    ) -> Result<AccountId, AppError> {
        match &confirmation.customer {
            CustomerRef::ProviderCustomer(customer_ref) => self
                .store
                .find_by_provider_customer(confirmation.provider, customer_ref)
                .await?
                .ok_or_else(|| {
                    DomainError::AccountNotFound(format!(
                        "{} customer {customer_ref}",
                        confirmation.provider
                    ))
                    .into()
                }),
            CustomerRef::Identity(id) => match self.store.find_by_identity(id).await? {
                Some(account) => Ok(account.id),
                None => Err(DomainError::AccountNotFound(id.to_string()).into()),
            },
        }
    }
}

/// What a provider transaction was credited as: account and amount
fn deposit_fingerprint(account: &AccountId, amount: Amount) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(amount.minor_units().to_string().as_bytes());
    hex::encode(hasher.finalize())
}
