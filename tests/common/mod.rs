//! Common test utilities
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tokio::sync::OnceCell;
use tower::util::ServiceExt;

use wallet_ledger::api::{self, AppState};
use wallet_ledger::domain::{Account, AccountId, Currency, ProviderKind};
use wallet_ledger::providers::{
    CheckoutRequest, CheckoutSession, PaymentProvider, ProviderError, ProviderRegistry,
    StripeProvider, TransactionVerification, WebhookEvent,
};
use wallet_ledger::store::{AccountStore, MemoryStore, WalletStore};
use wallet_ledger::Config;

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_integration";
pub const FRONTEND_URL: &str = "https://shop.test";

// =========================================================================
// Scripted Flutterwave
// =========================================================================

/// Flutterwave stand-in whose verification answers are set by the test
#[derive(Default)]
pub struct ScriptedFlutterwave {
    verdicts: Mutex<HashMap<String, TransactionVerification>>,
}

impl ScriptedFlutterwave {
    pub fn set_verdict(&self, transaction: &str, verdict: TransactionVerification) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(transaction.to_string(), verdict);
    }
}

#[async_trait]
impl PaymentProvider for ScriptedFlutterwave {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Flutterwave
    }

    fn signature_header(&self) -> &'static str {
        "verif-hash"
    }

    async fn create_customer(&self, account: &Account) -> Result<String, ProviderError> {
        Ok(account.id.to_string())
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        Ok(CheckoutSession {
            provider: ProviderKind::Flutterwave,
            session_id: request.reference.clone(),
            url: format!("https://checkout.flutterwave.test/{}", request.reference),
        })
    }

    async fn verify_transaction(
        &self,
        transaction_ref: &str,
    ) -> Result<TransactionVerification, ProviderError> {
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .get(transaction_ref)
            .cloned()
            .unwrap_or(TransactionVerification::NotConfirmed {
                status: "not found".to_string(),
            }))
    }

    fn verify_webhook(
        &self,
        _payload: &[u8],
        _signature: Option<&str>,
    ) -> Result<WebhookEvent, ProviderError> {
        Err(ProviderError::InvalidSignature("not scripted".to_string()))
    }
}

// =========================================================================
// In-memory application
// =========================================================================

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub flutterwave: Arc<ScriptedFlutterwave>,
}

/// Full router over the in-memory store, a real Stripe adapter (webhook
/// checks need no network) and a scripted Flutterwave.
pub fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let flutterwave = Arc::new(ScriptedFlutterwave::default());
    let stripe = StripeProvider::new(
        reqwest::Client::new(),
        "http://127.0.0.1:9".to_string(),
        "sk_test_integration".to_string(),
        STRIPE_WEBHOOK_SECRET.to_string(),
        Currency::nzd(),
    );
    let providers = ProviderRegistry::new()
        .with(Arc::new(stripe))
        .with(flutterwave.clone());

    let config = Config {
        frontend_url: FRONTEND_URL.to_string(),
        ..Config::default()
    };

    let router = api::build_router(AppState::new(store.clone(), providers, config));
    TestApp {
        router,
        store,
        flutterwave,
    }
}

/// Register an account directly in the store with an opening balance
pub async fn seed_account(store: &MemoryStore, email: &str, balance: i64) -> AccountId {
    let id = AccountId::parse(email).unwrap();
    store
        .create_account(&Account::register(id.clone(), email))
        .await
        .unwrap();
    if balance > 0 {
        store.adjust_balance(&id, balance).await.unwrap();
    }
    id
}

pub async fn balance_of(store: &MemoryStore, email: &str) -> i64 {
    store
        .get_balance(&AccountId::parse(email).unwrap())
        .await
        .unwrap()
        .minor_units()
}

/// JSON request, optionally carrying the gateway identity header
pub fn json_request(method: &str, uri: &str, caller: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(caller) = caller {
        builder = builder.header("x-authenticated-user", caller);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, caller: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(caller) = caller {
        builder = builder.header("x-authenticated-user", caller);
    }
    builder.body(Body::empty()).unwrap()
}

/// Send a request and decode the JSON body (Null when empty or not JSON)
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

// =========================================================================
// PostgreSQL
// =========================================================================

static SCHEMA: OnceCell<()> = OnceCell::const_new();

/// Connect to DATABASE_URL and apply the schema, or None when unset
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    SCHEMA
        .get_or_init(|| async {
            pool.execute(include_str!("../../migrations/0001_wallet_ledger.sql"))
                .await
                .expect("Failed to apply schema");
        })
        .await;

    Some(pool)
}

/// Identity unique to one test run, so tests can share a database
pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@test.invalid", uuid::Uuid::new_v4().simple())
}
