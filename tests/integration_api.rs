//! API Integration Tests
//!
//! Drive the full router over the in-memory store.

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use wallet_ledger::domain::{AmountUnit, Currency, CustomerRef, DepositConfirmation, GrossAmount, ProviderKind};
use wallet_ledger::providers::{stripe, TransactionVerification};
use wallet_ledger::store::AccountStore;

mod common;

use common::{balance_of, get_request, json_request, seed_account, send, spawn_app};

fn stripe_completed_event(session_id: &str, customer: &str, amount: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": format!("evt_{session_id}"),
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "object": "checkout.session",
            "payment_status": "paid",
            "amount_subtotal": amount,
            "currency": "nzd",
            "customer": customer
        }}
    }))
    .unwrap()
}

fn stripe_webhook_request(payload: Vec<u8>, signature: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/stripe")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(axum::body::Body::from(payload))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app();
    let response = app
        .router
        .clone()
        .oneshot(get_request("/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_transfer_e2e() {
    let app = spawn_app();

    // 1. Register both accounts through the API
    for (email, name) in [("alice@example.com", "Alice"), ("bob@example.com", "Bob")] {
        let (status, body) = send(
            &app.router,
            json_request("POST", "/api/v1/accounts", Some(email), json!({ "name": name })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "registration failed: {body}");
        assert_eq!(body["balance"], 0);
        assert_eq!(body["currency"], "nzd");
    }

    // 2. Fund Alice directly
    wallet_ledger::store::WalletStore::adjust_balance(
        app.store.as_ref(),
        &wallet_ledger::AccountId::parse("alice@example.com").unwrap(),
        1000,
    )
    .await
    .unwrap();

    // 3. Verify the receiver before sending
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/transactions/verify-account",
            Some("alice@example.com"),
            json!({ "identity": "BOB@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Bob");

    // 4. Transfer
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/transactions/transfer",
            Some("alice@example.com"),
            json!({ "receiver": "bob@example.com", "amount": 300, "description": "rent" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "transfer failed: {body}");
    assert_eq!(body["balance"], 700);
    assert_eq!(body["entry"]["amount"], 300);
    assert_eq!(body["entry"]["sender"], "alice@example.com");
    assert_eq!(body["entry"]["receiver"], "bob@example.com");
    assert_eq!(body["entry"]["status"], "success");
    let entry_id = body["entry"]["id"].as_str().unwrap().to_string();

    // 5. Balances and history
    let (_, me) = send(&app.router, get_request("/api/v1/accounts/me", Some("bob@example.com"))).await;
    assert_eq!(me["balance"], 300);

    let (status, history) = send(
        &app.router,
        get_request("/api/v1/transactions", Some("bob@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["entries"].as_array().unwrap().len(), 1);
    assert_eq!(history["entries"][0]["id"], entry_id.as_str());

    let (status, _) = send(
        &app.router,
        get_request(&format!("/api/v1/transactions/{entry_id}"), Some("alice@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_transaction_hidden_from_non_parties() {
    let app = spawn_app();
    seed_account(&app.store, "alice@example.com", 500).await;
    seed_account(&app.store, "bob@example.com", 0).await;
    seed_account(&app.store, "carol@example.com", 0).await;

    let (_, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/transactions/transfer",
            Some("alice@example.com"),
            json!({ "receiver": "bob@example.com", "amount": 100 }),
        ),
    )
    .await;
    let entry_id = body["entry"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app.router,
        get_request(&format!("/api/v1/transactions/{entry_id}"), Some("carol@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "forbidden");

    let (status, _) = send(
        &app.router,
        get_request(
            &format!("/api/v1/transactions/{}", uuid::Uuid::new_v4()),
            Some("carol@example.com"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_transfer_requires_identity() {
    let app = spawn_app();
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/transactions/transfer",
            None,
            json!({ "receiver": "bob@example.com", "amount": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "unauthenticated");

    let (status, _) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/transactions/transfer",
            Some("not-an-email"),
            json!({ "receiver": "bob@example.com", "amount": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_insufficient_funds_api() {
    let app = spawn_app();
    seed_account(&app.store, "alice@example.com", 100).await;
    seed_account(&app.store, "bob@example.com", 0).await;

    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/transactions/transfer",
            Some("alice@example.com"),
            json!({ "receiver": "bob@example.com", "amount": 101 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "insufficient_funds");
    assert_eq!(balance_of(&app.store, "alice@example.com").await, 100);
    assert_eq!(balance_of(&app.store, "bob@example.com").await, 0);
    assert_eq!(app.store.entry_count().await, 0);
}

#[tokio::test]
async fn test_idempotency_api() {
    let app = spawn_app();
    seed_account(&app.store, "alice@example.com", 1000).await;
    seed_account(&app.store, "bob@example.com", 0).await;

    let request = |amount: i64| {
        let mut request = json_request(
            "POST",
            "/api/v1/transactions/transfer",
            Some("alice@example.com"),
            json!({ "receiver": "bob@example.com", "amount": amount }),
        );
        request
            .headers_mut()
            .insert("idempotency-key", "order-17".parse().unwrap());
        request
    };

    let (first_status, first) = send(&app.router, request(250)).await;
    let (second_status, second) = send(&app.router, request(250)).await;
    let (third_status, third) = send(&app.router, request(999)).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second["replayed"], true);
    assert_eq!(second["entry"]["id"], first["entry"]["id"]);
    assert_eq!(third_status, StatusCode::CONFLICT);
    assert_eq!(third["error_code"], "idempotency_conflict");

    assert_eq!(balance_of(&app.store, "alice@example.com").await, 750);
    assert_eq!(app.store.entry_count().await, 1);
}

#[tokio::test]
async fn test_stripe_webhook_credits_once() {
    let app = spawn_app();
    let alice = seed_account(&app.store, "alice@example.com", 0).await;
    app.store
        .save_provider_customer(&alice, ProviderKind::Stripe, "cus_alice")
        .await
        .unwrap();

    let payload = stripe_completed_event("cs_test_a1", "cus_alice", 2500);
    let signature =
        stripe::signature_header(common::STRIPE_WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &payload)
            .unwrap();

    let (status, first) = send(&app.router, stripe_webhook_request(payload.clone(), &signature)).await;
    assert_eq!(status, StatusCode::OK, "webhook failed: {first}");
    assert_eq!(first["outcome"], "credited");
    assert_eq!(first["newly_credited"], true);

    // Stripe redelivers the same event
    let (status, second) = send(&app.router, stripe_webhook_request(payload, &signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["newly_credited"], false);
    assert_eq!(second["entry"]["id"], first["entry"]["id"]);

    assert_eq!(balance_of(&app.store, "alice@example.com").await, 2500);
    assert_eq!(app.store.entry_count().await, 1);
    assert_eq!(first["entry"]["sender"], "external");
    assert_eq!(first["entry"]["description"], "Stripe Deposit");
}

#[tokio::test]
async fn test_stripe_webhook_invalid_signature() {
    let app = spawn_app();
    let alice = seed_account(&app.store, "alice@example.com", 0).await;
    app.store
        .save_provider_customer(&alice, ProviderKind::Stripe, "cus_alice")
        .await
        .unwrap();

    let payload = stripe_completed_event("cs_test_a2", "cus_alice", 2500);
    let forged = stripe::signature_header("whsec_attacker", chrono::Utc::now().timestamp(), &payload)
        .unwrap();

    let (status, body) = send(&app.router, stripe_webhook_request(payload.clone(), &forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_signature");

    let unsigned = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/stripe")
        .body(axum::body::Body::from(payload))
        .unwrap();
    let (status, _) = send(&app.router, unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(balance_of(&app.store, "alice@example.com").await, 0);
    assert_eq!(app.store.entry_count().await, 0);
}

#[tokio::test]
async fn test_stripe_webhook_ignores_other_events() {
    let app = spawn_app();
    let payload = serde_json::to_vec(&json!({
        "id": "evt_x",
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_1" } }
    }))
    .unwrap();
    let signature =
        stripe::signature_header(common::STRIPE_WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &payload)
            .unwrap();

    let (status, body) = send(&app.router, stripe_webhook_request(payload, &signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["event_type"], "payment_intent.created");
}

fn flutterwave_confirmation(transaction: &str, email: &str, major: i64) -> TransactionVerification {
    TransactionVerification::Confirmed(DepositConfirmation {
        provider: ProviderKind::Flutterwave,
        provider_transaction_id: transaction.to_string(),
        customer: CustomerRef::Identity(wallet_ledger::AccountId::parse(email).unwrap()),
        gross: GrossAmount {
            value: Decimal::from(major),
            unit: AmountUnit::Major,
            currency: Currency::nzd(),
        },
        description: "Flutterwave Deposit".to_string(),
    })
}

fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_flutterwave_redirect_trusts_only_verification() {
    let app = spawn_app();
    seed_account(&app.store, "alice@example.com", 0).await;
    app.flutterwave.set_verdict(
        "5001",
        TransactionVerification::NotConfirmed {
            status: "failed".to_string(),
        },
    );

    // Client claims success, provider disagrees
    let response = app
        .router
        .clone()
        .oneshot(get_request(
            "/api/v1/deposits/flutterwave/callback?status=successful&tx_ref=wallet-1&transaction_id=5001",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://shop.test/wallet?payment=failed");
    assert_eq!(balance_of(&app.store, "alice@example.com").await, 0);

    // Provider confirms a different transaction
    app.flutterwave
        .set_verdict("5002", flutterwave_confirmation("5002", "alice@example.com", 40));
    let response = app
        .router
        .clone()
        .oneshot(get_request(
            "/api/v1/deposits/flutterwave/callback?status=successful&tx_ref=wallet-2&transaction_id=5002",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://shop.test/wallet?payment=successful");
    assert_eq!(balance_of(&app.store, "alice@example.com").await, 4000);

    // Browser reloads the callback page
    let response = app
        .router
        .clone()
        .oneshot(get_request(
            "/api/v1/deposits/flutterwave/callback?status=successful&tx_ref=wallet-2&transaction_id=5002",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "https://shop.test/wallet?payment=successful");
    assert_eq!(balance_of(&app.store, "alice@example.com").await, 4000);
    assert_eq!(app.store.entry_count().await, 1);
}

#[tokio::test]
async fn test_flutterwave_redirect_cancelled() {
    let app = spawn_app();
    seed_account(&app.store, "alice@example.com", 0).await;
    app.flutterwave
        .set_verdict("5003", flutterwave_confirmation("5003", "alice@example.com", 10));

    let response = app
        .router
        .clone()
        .oneshot(get_request(
            "/api/v1/deposits/flutterwave/callback?status=cancelled&tx_ref=wallet-3&transaction_id=5003",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "https://shop.test/wallet?payment=failed");
    assert_eq!(balance_of(&app.store, "alice@example.com").await, 0);
}

#[tokio::test]
async fn test_flutterwave_checkout_session() {
    let app = spawn_app();
    seed_account(&app.store, "alice@example.com", 0).await;

    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/deposits/flutterwave",
            Some("alice@example.com"),
            json!({ "amount": 5000 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "checkout failed: {body}");
    assert_eq!(body["provider"], "flutterwave");
    let url: &str = body["url"].as_str().unwrap();
    assert!(url.starts_with("https://checkout.flutterwave.test/wallet-"));
    assert_eq!(
        app.store
            .provider_customer(
                &wallet_ledger::AccountId::parse("alice@example.com").unwrap(),
                ProviderKind::Flutterwave
            )
            .await
            .unwrap()
            .as_deref(),
        Some("alice@example.com")
    );
}

#[tokio::test]
async fn test_register_duplicate_account() {
    let app = spawn_app();
    seed_account(&app.store, "alice@example.com", 0).await;

    let (status, body): (StatusCode, Value) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/accounts",
            Some("alice@example.com"),
            json!({ "name": "Alice" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "account_already_exists");
}

#[tokio::test]
async fn test_unusable_signed_webhook_is_client_error() {
    let app = spawn_app();
    let payload = br#"{"type":"checkout.session.completed"}"#.to_vec();
    let signature =
        stripe::signature_header(common::STRIPE_WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &payload)
            .unwrap();

    let (status, body) = send(&app.router, stripe_webhook_request(payload, &signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
    assert_eq!(app.store.entry_count().await, 0);
}
