//! Flutterwave adapter
//!
//! Flutterwave has no customer object and its webhook bodies are not signed,
//! only tagged with a shared `verif-hash`. Every webhook or redirect is
//! therefore re-verified against `/v3/transactions/{id}/verify` before money
//! moves.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::domain::{
    Account, AccountId, AmountUnit, Currency, CustomerRef, DepositConfirmation, GrossAmount,
    ProviderKind,
};

use super::{
    constant_time_eq, ensure_success, CheckoutRequest, CheckoutSession, PaymentProvider,
    ProviderError, TransactionVerification, WebhookEvent,
};

const CHARGE_COMPLETED: &str = "charge.completed";

/// Flutterwave payment provider
#[derive(Debug, Clone)]
pub struct FlutterwaveProvider {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_hash: Option<String>,
    currency: Currency,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaymentLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct FlwTransaction {
    id: i64,
    #[serde(default)]
    tx_ref: Option<String>,
    status: String,
    amount: Decimal,
    currency: String,
    customer: FlwCustomer,
}

#[derive(Debug, Deserialize)]
struct FlwCustomer {
    email: String,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    event: String,
    #[serde(default)]
    data: WebhookData,
}

/// Only charge events are required to carry `id`
#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    status: Option<String>,
}

impl FlwTransaction {
    fn into_confirmation(self) -> Result<DepositConfirmation, ProviderError> {
        let currency = Currency::parse(&self.currency)
            .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
        let customer = AccountId::parse(&self.customer.email)
            .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;

        Ok(DepositConfirmation {
            provider: ProviderKind::Flutterwave,
            provider_transaction_id: self.id.to_string(),
            customer: CustomerRef::Identity(customer),
            gross: GrossAmount {
                value: self.amount,
                unit: AmountUnit::Major,
                currency,
            },
            description: ProviderKind::Flutterwave.deposit_description().to_string(),
        })
    }
}

impl FlutterwaveProvider {
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        secret_key: String,
        webhook_hash: Option<String>,
        currency: Currency,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
            webhook_hash,
            currency,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn payment_body(&self, request: &CheckoutRequest) -> serde_json::Value {
        json!({
            "tx_ref": request.reference,
            "amount": request.amount.to_major(request.currency.exponent()).to_string(),
            "currency": request.currency.code().to_uppercase(),
            "redirect_url": request.success_url,
            "customer": {
                "email": request.account.as_str(),
                "name": request.account_name,
            },
            "customizations": {
                "title": "Wallet deposit",
            },
            "meta": {
                "cancel_url": request.cancel_url,
            },
        })
    }

    /// Decode a `/verify` response body into a verification verdict
    fn verdict(envelope: Envelope<FlwTransaction>) -> Result<TransactionVerification, ProviderError> {
        if envelope.status != "success" {
            return Ok(TransactionVerification::NotConfirmed {
                status: envelope.message.unwrap_or(envelope.status),
            });
        }
        let transaction = envelope.data.ok_or_else(|| {
            ProviderError::UnexpectedResponse("verify response has no data".to_string())
        })?;
        if transaction.status != "successful" {
            return Ok(TransactionVerification::NotConfirmed {
                status: transaction.status,
            });
        }
        tracing::debug!(
            transaction = transaction.id,
            tx_ref = transaction.tx_ref.as_deref().unwrap_or("-"),
            "Flutterwave transaction verified"
        );
        Ok(TransactionVerification::Confirmed(
            transaction.into_confirmation()?,
        ))
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Flutterwave
    }

    fn signature_header(&self) -> &'static str {
        "verif-hash"
    }

    /// Flutterwave identifies customers by email, so the account identity is
    /// the customer reference.
    async fn create_customer(&self, account: &Account) -> Result<String, ProviderError> {
        Ok(account.id.as_str().to_string())
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        if request.currency != self.currency {
            tracing::warn!(
                requested = %request.currency,
                wallet = %self.currency,
                "Flutterwave checkout in a currency other than the wallet currency"
            );
        }

        let response = self
            .client
            .post(self.url("/v3/payments"))
            .bearer_auth(&self.secret_key)
            .json(&self.payment_body(request))
            .send()
            .await?;

        let envelope: Envelope<PaymentLink> = ensure_success(response).await?.json().await?;
        if envelope.status != "success" {
            return Err(ProviderError::Rejected {
                status: 200,
                message: envelope.message.unwrap_or(envelope.status),
            });
        }
        let link = envelope.data.ok_or_else(|| {
            ProviderError::UnexpectedResponse("payment response has no link".to_string())
        })?;

        Ok(CheckoutSession {
            provider: ProviderKind::Flutterwave,
            session_id: request.reference.clone(),
            url: link.link,
        })
    }

    async fn verify_transaction(
        &self,
        transaction_ref: &str,
    ) -> Result<TransactionVerification, ProviderError> {
        if transaction_ref.is_empty() || !transaction_ref.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(TransactionVerification::NotConfirmed {
                status: "malformed transaction id".to_string(),
            });
        }

        let response = self
            .client
            .get(self.url(&format!("/v3/transactions/{transaction_ref}/verify")))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        // Unknown transactions come back as 4xx with an error envelope; that is
        // a negative verdict, not an outage.
        if response.status().is_client_error() {
            let status = response.status().as_u16();
            return Ok(TransactionVerification::NotConfirmed {
                status: format!("rejected ({status})"),
            });
        }

        let envelope: Envelope<FlwTransaction> = ensure_success(response).await?.json().await?;
        Self::verdict(envelope)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, ProviderError> {
        let expected = self.webhook_hash.as_deref().ok_or_else(|| {
            ProviderError::InvalidSignature("no webhook hash configured".to_string())
        })?;
        let presented = signature
            .ok_or_else(|| ProviderError::InvalidSignature("missing verif-hash header".to_string()))?;
        if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            return Err(ProviderError::InvalidSignature(
                "verif-hash does not match".to_string(),
            ));
        }

        let body: WebhookBody = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::MalformedWebhook(e.to_string()))?;

        if body.event != CHARGE_COMPLETED || body.data.status.as_deref() != Some("successful") {
            return Ok(WebhookEvent::Ignored {
                event_type: body.event,
            });
        }

        let id = body.data.id.ok_or_else(|| {
            ProviderError::MalformedWebhook(format!("{CHARGE_COMPLETED} without data.id"))
        })?;
        Ok(WebhookEvent::PaymentReported {
            transaction_ref: id.to_string(),
        })
    }
}
