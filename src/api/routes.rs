//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Account, Amount, LedgerEntry, OperationContext, ProviderKind};
use crate::error::AppError;
use crate::handlers::{
    AccountHandler, AccountSummary, CheckoutCommand, CheckoutHandler, DepositHandler,
    FlutterwaveRedirect, RegisterAccountCommand, TransferCommand, TransferHandler,
    VerifyAccountCommand, WebhookOutcome,
};
use crate::providers::CheckoutSession;

use super::AppState;

/// Header a client sets to make a transfer safe to retry
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub identity: String,
    pub name: String,
    /// Minor units of `currency`
    pub balance: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl AccountResponse {
    fn new(account: Account, state: &AppState) -> Self {
        Self {
            identity: account.id.to_string(),
            name: account.name,
            balance: account.balance.minor_units(),
            currency: state.config.wallet_currency.to_string(),
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub receiver: String,
    /// Minor units of the wallet currency
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub entry: LedgerEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    pub replayed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyAccountRequest {
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub identity: String,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Minor units of the wallet currency
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Accounts
        .route("/accounts", post(create_account))
        .route("/accounts/me", get(get_my_account))
        // Transfers and history
        .route("/transactions", get(list_transactions))
        .route("/transactions/transfer", post(transfer))
        .route("/transactions/verify-account", post(verify_account))
        .route("/transactions/:entry_id", get(get_transaction))
        // Deposits
        .route("/deposits/stripe", post(stripe_checkout))
        .route("/deposits/flutterwave", post(flutterwave_checkout))
        .route("/deposits/flutterwave/callback", get(flutterwave_callback))
        // Provider webhooks (no caller identity)
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/webhooks/flutterwave", post(flutterwave_webhook))
}

// =========================================================================
// POST /accounts
// =========================================================================

/// Register the caller's wallet
async fn create_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let handler = AccountHandler::new(state.store.clone());
    let account = handler
        .register(RegisterAccountCommand::new(request.name), &context)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse::new(account, &state)),
    ))
}

// =========================================================================
// GET /accounts/me
// =========================================================================

async fn get_my_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = AccountHandler::new(state.store.clone()).me(&context).await?;
    Ok(Json(AccountResponse::new(account, &state)))
}

// =========================================================================
// POST /transactions/transfer
// =========================================================================

/// Send money from the caller to another account
async fn transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), AppError> {
    let idempotency_key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => Some(value.to_str().map_err(|_| {
            AppError::InvalidRequest("Idempotency-Key must be visible ASCII".to_string())
        })?),
        None => None,
    };

    let command = TransferCommand {
        receiver: request.receiver,
        amount: request.amount,
        description: request.description,
    };

    let handler = TransferHandler::new(state.store.clone());
    let result = handler.execute(command, idempotency_key, &context).await?;

    let status = if result.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(TransferResponse {
            entry: result.entry,
            balance: result.sender_balance.map(|b| b.minor_units()),
            replayed: result.replayed,
        }),
    ))
}

// =========================================================================
// POST /transactions/verify-account
// =========================================================================

/// Look up a receiver's display name before sending
async fn verify_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<VerifyAccountRequest>,
) -> Result<Json<AccountSummary>, AppError> {
    let summary = AccountHandler::new(state.store.clone())
        .verify_account(
            VerifyAccountCommand {
                identity: request.identity,
            },
            &context,
        )
        .await?;
    Ok(Json(summary))
}

// =========================================================================
// GET /transactions
// =========================================================================

async fn list_transactions(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let entries = AccountHandler::new(state.store.clone())
        .list_transactions(&context)
        .await?;
    let identity = context
        .caller
        .as_ref()
        .map(|caller| caller.to_string())
        .unwrap_or_default();

    Ok(Json(TransactionsResponse { identity, entries }))
}

// =========================================================================
// GET /transactions/:entry_id
// =========================================================================

async fn get_transaction(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<LedgerEntry>, AppError> {
    let entry = AccountHandler::new(state.store.clone())
        .get_transaction(entry_id, &context)
        .await?;
    Ok(Json(entry))
}

// =========================================================================
// POST /deposits/{stripe,flutterwave}
// =========================================================================

async fn stripe_checkout(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<CheckoutSession>), AppError> {
    checkout(state, ProviderKind::Stripe, context, request).await
}

async fn flutterwave_checkout(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<CheckoutSession>), AppError> {
    checkout(state, ProviderKind::Flutterwave, context, request).await
}

async fn checkout(
    state: AppState,
    kind: ProviderKind,
    context: OperationContext,
    request: DepositRequest,
) -> Result<(StatusCode, Json<CheckoutSession>), AppError> {
    let handler = CheckoutHandler::new(
        state.store.clone(),
        state.providers.clone(),
        state.config.clone(),
    );
    let session = handler
        .execute(kind, CheckoutCommand::new(request.amount), &context)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

// =========================================================================
// GET /deposits/flutterwave/callback
// =========================================================================

/// Browser return from the hosted checkout; always answers with a redirect
async fn flutterwave_callback(
    State(state): State<AppState>,
    Query(redirect): Query<FlutterwaveRedirect>,
) -> Redirect {
    match deposit_handler(&state).handle_redirect(redirect).await {
        Ok(outcome) => {
            tracing::info!(
                entry_id = %outcome.entry.id,
                newly_credited = outcome.newly_credited,
                "Flutterwave redirect reconciled"
            );
            Redirect::to(&state.config.deposit_success_url())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Flutterwave redirect not credited");
            Redirect::to(&state.config.deposit_failure_url())
        }
    }
}

// =========================================================================
// POST /webhooks/{stripe,flutterwave}
// =========================================================================

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    webhook(state, ProviderKind::Stripe, headers, body).await
}

async fn flutterwave_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    webhook(state, ProviderKind::Flutterwave, headers, body).await
}

async fn webhook(
    state: AppState,
    kind: ProviderKind,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let header = state.providers.get(kind)?.signature_header();
    let signature = headers.get(header).and_then(|v| v.to_str().ok());

    let outcome = deposit_handler(&state)
        .handle_webhook(kind, &body, signature)
        .await?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}

fn deposit_handler(state: &AppState) -> DepositHandler {
    DepositHandler::new(
        state.store.clone(),
        state.providers.clone(),
        state.config.wallet_currency.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_request_amount_is_minor_units() {
        let request: TransferRequest =
            serde_json::from_str(r#"{"receiver":"b@example.com","amount":300}"#).unwrap();
        assert_eq!(request.amount.minor_units(), 300);
        assert!(request.description.is_none());

        let negative: Result<TransferRequest, _> =
            serde_json::from_str(r#"{"receiver":"b@example.com","amount":-5}"#);
        assert!(negative.is_err());
    }
}
