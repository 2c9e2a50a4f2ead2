//! Stripe adapter
//!
//! Customers and Checkout Sessions through the Stripe REST API, and webhook
//! authentication through the `Stripe-Signature` header.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;

use crate::domain::{
    Account, AccountId, AmountUnit, Currency, CustomerRef, DepositConfirmation, GrossAmount,
    ProviderKind,
};

use super::{
    ensure_success, CheckoutRequest, CheckoutSession, PaymentProvider, ProviderError,
    TransactionVerification, WebhookEvent,
};

/// Maximum accepted age of a signed webhook, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

/// Stripe payment provider
#[derive(Debug, Clone)]
pub struct StripeProvider {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    currency: Currency,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    amount_subtotal: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
}

impl StripeCheckoutSession {
    fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    fn into_confirmation(self) -> Result<DepositConfirmation, ProviderError> {
        let customer = match (self.customer, self.client_reference_id) {
            (Some(customer), _) => CustomerRef::ProviderCustomer(customer),
            (None, Some(reference)) => CustomerRef::Identity(
                AccountId::parse(&reference)
                    .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?,
            ),
            (None, None) => {
                return Err(ProviderError::UnexpectedResponse(format!(
                    "checkout session {} has no customer",
                    self.id
                )))
            }
        };

        // Credit what the customer was charged: amount_total is after
        // discounts and promotion codes, amount_subtotal only before them.
        let amount = self.amount_total.or(self.amount_subtotal).ok_or_else(|| {
            ProviderError::UnexpectedResponse(format!(
                "checkout session {} has no amount",
                self.id
            ))
        })?;
        let currency = self
            .currency
            .as_deref()
            .ok_or_else(|| {
                ProviderError::UnexpectedResponse(format!(
                    "checkout session {} has no currency",
                    self.id
                ))
            })
            .and_then(|code| {
                Currency::parse(code).map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))
            })?;

        Ok(DepositConfirmation {
            provider: ProviderKind::Stripe,
            provider_transaction_id: self.id,
            customer,
            gross: GrossAmount {
                value: Decimal::from(amount),
                unit: AmountUnit::Minor,
                currency,
            },
            description: ProviderKind::Stripe.deposit_description().to_string(),
        })
    }
}

impl StripeProvider {
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        secret_key: String,
        webhook_secret: String,
        currency: Currency,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
            webhook_secret,
            currency,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let major = request.amount.to_major(request.currency.exponent());
        vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            (
                "line_items[0][price_data][currency]".into(),
                request.currency.code().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                "Wallet deposit".into(),
            ),
            (
                "line_items[0][price_data][product_data][description]".into(),
                format!("Make a deposit of {major} {} to your wallet", request.currency.code().to_uppercase()),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount.minor_units().to_string(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
            ("customer".into(), request.customer_ref.clone()),
            ("client_reference_id".into(), request.account.to_string()),
            ("metadata[reference]".into(), request.reference.clone()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
        ]
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    async fn create_customer(&self, account: &Account) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.url("/v1/customers"))
            .bearer_auth(&self.secret_key)
            .form(&[("email", account.id.as_str()), ("name", account.name.as_str())])
            .send()
            .await?;

        let customer: StripeCustomer = ensure_success(response).await?.json().await?;
        tracing::info!(account = %account.id, customer = %customer.id, "Stripe customer created");
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let response = self
            .client
            .post(self.url("/v1/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&self.checkout_form(request))
            .send()
            .await?;

        let session: StripeCheckoutSession = ensure_success(response).await?.json().await?;
        let url = session.url.ok_or_else(|| {
            ProviderError::UnexpectedResponse("checkout session has no url".to_string())
        })?;

        Ok(CheckoutSession {
            provider: ProviderKind::Stripe,
            session_id: session.id,
            url,
        })
    }

    async fn verify_transaction(
        &self,
        transaction_ref: &str,
    ) -> Result<TransactionVerification, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/checkout/sessions/{transaction_ref}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let session: StripeCheckoutSession = ensure_success(response).await?.json().await?;
        if !session.is_paid() {
            return Ok(TransactionVerification::NotConfirmed {
                status: session
                    .payment_status
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }
        Ok(TransactionVerification::Confirmed(session.into_confirmation()?))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, ProviderError> {
        let header = signature.ok_or_else(|| {
            ProviderError::InvalidSignature("missing Stripe-Signature header".to_string())
        })?;
        verify_signature(
            payload,
            header,
            &self.webhook_secret,
            chrono::Utc::now().timestamp(),
            SIGNATURE_TOLERANCE_SECS,
        )?;

        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::MalformedWebhook(e.to_string()))?;

        if event.event_type != CHECKOUT_COMPLETED && event.event_type != ASYNC_PAYMENT_SUCCEEDED {
            return Ok(WebhookEvent::Ignored {
                event_type: event.event_type,
            });
        }

        let session: StripeCheckoutSession = serde_json::from_value(event.data.object)
            .map_err(|e| ProviderError::MalformedWebhook(format!("event {}: {e}", event.id)))?;

        // A completed session with delayed payment methods is not yet paid;
        // the async_payment_succeeded event follows later.
        if !session.is_paid() {
            return Ok(WebhookEvent::Ignored {
                event_type: format!(
                    "{} ({})",
                    event.event_type,
                    session.payment_status.as_deref().unwrap_or("unknown")
                ),
            });
        }

        let confirmation = session
            .into_confirmation()
            .map_err(|e| ProviderError::MalformedWebhook(e.to_string()))?;
        if confirmation.gross.currency != self.currency {
            tracing::warn!(
                session = %confirmation.provider_transaction_id,
                currency = %confirmation.gross.currency,
                "Stripe session currency differs from wallet currency"
            );
        }
        Ok(WebhookEvent::PaymentConfirmed(confirmation))
    }
}

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
/// against the endpoint secret. The signed message is `"{t}.{payload}"`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), ProviderError> {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ProviderError::InvalidSignature("no timestamp in header".to_string()))?;
    if candidates.is_empty() {
        return Err(ProviderError::InvalidSignature(
            "no v1 signature in header".to_string(),
        ));
    }

    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| ProviderError::InvalidSignature("malformed timestamp".to_string()))?;
    let within_tolerance = now
        .checked_sub(signed_at)
        .map(i64::unsigned_abs)
        .is_some_and(|skew| skew <= tolerance_secs.unsigned_abs());
    if !within_tolerance {
        return Err(ProviderError::InvalidSignature(
            "timestamp outside the tolerance zone".to_string(),
        ));
    }

    let mac = signed_mac(secret, timestamp, payload)?;
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|expected| mac.clone().verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(ProviderError::InvalidSignature(
            "no signature matches the payload".to_string(),
        ))
    }
}

fn signed_mac(secret: &str, timestamp: &str, payload: &[u8]) -> Result<Hmac<Sha256>, ProviderError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| ProviderError::InvalidSignature("unusable webhook secret".to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Produce a `Stripe-Signature` header value for `payload`
pub fn signature_header(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, ProviderError> {
    let mac = signed_mac(secret, &timestamp.to_string(), payload)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}
