//! Payment Providers module
//!
//! Uniform capability interface over the external payment providers. Each
//! adapter maps its provider's wire format onto these types; the rest of the
//! crate only picks an adapter by [`ProviderKind`].

mod error;
pub mod flutterwave;
pub mod stripe;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::domain::{Account, AccountId, Amount, Currency, DepositConfirmation, ProviderKind};

pub use error::ProviderError;
pub use flutterwave::FlutterwaveProvider;
pub use stripe::StripeProvider;

/// Hosted checkout to create for a deposit
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub account: AccountId,
    pub account_name: String,
    /// Provider customer reference from `create_customer`
    pub customer_ref: String,
    pub amount: Amount,
    pub currency: Currency,
    /// Our own reference for this checkout attempt
    pub reference: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Hosted checkout the client is sent to
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CheckoutSession {
    pub provider: ProviderKind,
    pub session_id: String,
    pub url: String,
}

/// Provider's answer to "did this transaction succeed?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionVerification {
    /// Provider explicitly reports the payment as completed
    Confirmed(DepositConfirmation),
    /// Anything else: pending, failed, cancelled, unknown
    NotConfirmed { status: String },
}

/// An authenticated webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Signed payload that itself proves the payment
    PaymentConfirmed(DepositConfirmation),
    /// Authentic notification whose payload is not signed; the transaction
    /// must still be verified with the provider
    PaymentReported { transaction_ref: String },
    /// Authentic event we have no use for
    Ignored { event_type: String },
}

/// Capability set every payment provider adapter offers
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Header carrying the webhook signature
    fn signature_header(&self) -> &'static str;

    /// Create the provider-side customer record for an account
    async fn create_customer(&self, account: &Account) -> Result<String, ProviderError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    /// Ask the provider for the authoritative state of a transaction
    async fn verify_transaction(
        &self,
        transaction_ref: &str,
    ) -> Result<TransactionVerification, ProviderError>;

    /// Authenticate and decode a webhook body. Nothing is trusted before the
    /// signature check passes.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, ProviderError>;
}

/// Adapters keyed by provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one of the same kind
    pub fn with(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Build adapters for every provider whose credentials are configured
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .connect_timeout(Duration::from_secs(config.provider_timeout_secs.min(5)))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let mut registry = Self::new();

        match (&config.stripe_secret_key, &config.stripe_webhook_secret) {
            (Some(secret_key), Some(webhook_secret)) => {
                registry = registry.with(Arc::new(StripeProvider::new(
                    client.clone(),
                    config.stripe_api_base.clone(),
                    secret_key.clone(),
                    webhook_secret.clone(),
                    config.wallet_currency.clone(),
                )));
            }
            (Some(_), None) => {
                tracing::warn!("STRIPE_WEBHOOK_SECRET missing; Stripe deposits disabled");
            }
            _ => tracing::info!("Stripe not configured"),
        }

        match (&config.flw_secret_key, &config.flw_webhook_hash) {
            (Some(secret_key), webhook_hash) => {
                if webhook_hash.is_none() {
                    tracing::warn!("FLW_WEBHOOK_HASH missing; Flutterwave webhooks will be rejected");
                }
                registry = registry.with(Arc::new(FlutterwaveProvider::new(
                    client,
                    config.flw_api_base.clone(),
                    secret_key.clone(),
                    webhook_hash.clone(),
                    config.wallet_currency.clone(),
                )));
            }
            _ => tracing::info!("Flutterwave not configured"),
        }

        Ok(registry)
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn PaymentProvider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(ProviderError::NotConfigured(kind))
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.kinds())
            .finish()
    }
}

/// Compare two secrets without short-circuiting on the first differing byte.
/// Both sides are hashed first so that length differences do not leak either.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let a = Sha256::digest(a);
    let b = Sha256::digest(b);
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Turn a non-success response into `ProviderError::Rejected`
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ProviderError::Rejected {
        status: status.as_u16(),
        message: message.chars().take(512).collect(),
    })
}
