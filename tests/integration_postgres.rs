//! PostgreSQL store integration tests
//!
//! Skipped unless DATABASE_URL points at a disposable database.

use std::sync::Arc;

use rust_decimal::Decimal;

use wallet_ledger::domain::{
    Account, AccountId, Amount, AmountUnit, Currency, CustomerRef, DepositConfirmation,
    DomainError, GrossAmount, NewLedgerEntry, OperationContext, ProviderKind, ProviderReference,
};
use wallet_ledger::handlers::{DepositHandler, TransferCommand, TransferHandler};
use wallet_ledger::providers::ProviderRegistry;
use wallet_ledger::store::{
    AccountStore, Claim, Ledger, OperationKey, PgStore, StoreError, WalletStore,
};
use wallet_ledger::AppError;

mod common;

use common::{setup_test_db, unique_email};

async fn seeded(store: &PgStore, prefix: &str, balance: i64) -> AccountId {
    let id = AccountId::parse(&unique_email(prefix)).unwrap();
    store
        .create_account(&Account::register(id.clone(), prefix))
        .await
        .unwrap();
    if balance > 0 {
        store.adjust_balance(&id, balance).await.unwrap();
    }
    id
}

#[tokio::test]
async fn test_pg_transfer_moves_funds_and_records_entry() {
    let Some(pool) = setup_test_db().await else { return };
    let store = Arc::new(PgStore::new(pool));
    let alice = seeded(&store, "alice", 1000).await;
    let bob = seeded(&store, "bob", 0).await;

    let handler = TransferHandler::new(store.clone());
    let context = OperationContext::new().with_caller(alice.clone());
    let result = handler
        .execute(
            TransferCommand::new(bob.to_string(), Amount::new(300).unwrap()),
            None,
            &context,
        )
        .await
        .unwrap();

    assert_eq!(store.get_balance(&alice).await.unwrap().minor_units(), 700);
    assert_eq!(store.get_balance(&bob).await.unwrap().minor_units(), 300);

    let stored = store.find_entry(result.entry.id).await.unwrap().unwrap();
    assert_eq!(stored, result.entry);
    assert_eq!(store.list_for_account(&bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pg_conditional_update_refuses_overdraft() {
    let Some(pool) = setup_test_db().await else { return };
    let store = PgStore::new(pool);
    let alice = seeded(&store, "alice", 100).await;

    let result = store.adjust_balance(&alice, -101).await;
    assert!(matches!(
        result,
        Err(StoreError::Domain(DomainError::InsufficientFunds { .. }))
    ));
    assert_eq!(store.get_balance(&alice).await.unwrap().minor_units(), 100);
}

#[tokio::test]
async fn test_pg_uncommitted_unit_leaves_no_trace() {
    let Some(pool) = setup_test_db().await else { return };
    let store = PgStore::new(pool);
    let alice = seeded(&store, "alice", 500).await;
    let bob = seeded(&store, "bob", 0).await;

    let entry = NewLedgerEntry::transfer(alice.clone(), bob.clone(), Amount::new(200).unwrap(), "x");
    let entry_id = entry.id;
    {
        let mut unit = store.begin().await.unwrap();
        unit.adjust_balance(&alice, -200).await.unwrap();
        unit.adjust_balance(&bob, 200).await.unwrap();
        unit.record(entry).await.unwrap();
        // dropped without commit
    }

    assert_eq!(store.get_balance(&alice).await.unwrap().minor_units(), 500);
    assert_eq!(store.get_balance(&bob).await.unwrap().minor_units(), 0);
    assert!(store.find_entry(entry_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pg_concurrent_transfers_never_overdraw() {
    let Some(pool) = setup_test_db().await else { return };
    let store = Arc::new(PgStore::new(pool));
    let alice = seeded(&store, "alice", 1000).await;
    let bob = seeded(&store, "bob", 0).await;

    let handler = Arc::new(TransferHandler::new(store.clone()));
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let handler = handler.clone();
        let alice = alice.clone();
        let bob = bob.clone();
        tasks.push(tokio::spawn(async move {
            let context = OperationContext::new().with_caller(alice);
            handler
                .execute(
                    TransferCommand::new(bob.to_string(), Amount::new(150).unwrap()),
                    None,
                    &context,
                )
                .await
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::Domain(DomainError::InsufficientFunds { .. })) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 6);
    assert_eq!(store.get_balance(&alice).await.unwrap().minor_units(), 100);
    assert_eq!(store.get_balance(&bob).await.unwrap().minor_units(), 900);
}

#[tokio::test]
async fn test_pg_operation_claimed_once() {
    let Some(pool) = setup_test_db().await else { return };
    let store = PgStore::new(pool);
    let alice = seeded(&store, "alice", 0).await;

    let transaction = uuid::Uuid::new_v4().to_string();
    let key = OperationKey::provider_transaction(ProviderKind::Flutterwave, &transaction, "fp");

    let entry = NewLedgerEntry::deposit(
        alice.clone(),
        Amount::new(500).unwrap(),
        "Flutterwave Deposit",
        ProviderReference {
            provider: ProviderKind::Flutterwave,
            transaction_id: transaction.clone(),
        },
    );
    let first_entry = entry.id;
    let mut unit = store.begin().await.unwrap();
    assert_eq!(unit.claim_operation(&key, first_entry).await.unwrap(), Claim::Fresh);
    unit.adjust_balance(&alice, 500).await.unwrap();
    unit.record(entry).await.unwrap();
    unit.commit().await.unwrap();

    let mut unit = store.begin().await.unwrap();
    let claim = unit
        .claim_operation(&key, uuid::Uuid::new_v4())
        .await
        .unwrap();
    drop(unit);

    assert_eq!(
        claim,
        Claim::Existing {
            entry_id: first_entry,
            fingerprint: "fp".to_string()
        }
    );
    assert_eq!(store.get_balance(&alice).await.unwrap().minor_units(), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pg_simultaneous_redeliveries_credit_once() {
    let Some(pool) = setup_test_db().await else { return };
    let store = Arc::new(PgStore::new(pool));
    let alice = seeded(&store, "alice", 0).await;
    let transaction = uuid::Uuid::new_v4().simple().to_string();

    let handler = Arc::new(DepositHandler::new(
        store.clone(),
        ProviderRegistry::new(),
        Currency::nzd(),
    ));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let handler = handler.clone();
        let confirmation = DepositConfirmation {
            provider: ProviderKind::Flutterwave,
            provider_transaction_id: transaction.clone(),
            customer: CustomerRef::Identity(alice.clone()),
            gross: GrossAmount {
                value: Decimal::from(15),
                unit: AmountUnit::Major,
                currency: Currency::nzd(),
            },
            description: "Flutterwave Deposit".to_string(),
        };
        tasks.push(tokio::spawn(async move { handler.reconcile(confirmation).await }));
    }

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap().unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| o.newly_credited).count(), 1);
    let credited = outcomes[0].entry.id;
    assert!(outcomes.iter().all(|o| o.entry.id == credited));
    assert_eq!(store.get_balance(&alice).await.unwrap().minor_units(), 1500);
    assert_eq!(store.list_for_account(&alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pg_provider_customer_insert_if_absent() {
    let Some(pool) = setup_test_db().await else { return };
    let store = PgStore::new(pool);
    let alice = seeded(&store, "alice", 0).await;
    let customer = format!("cus_{}", uuid::Uuid::new_v4().simple());

    let saved = store
        .save_provider_customer(&alice, ProviderKind::Stripe, &customer)
        .await
        .unwrap();
    assert_eq!(saved, customer);

    // A racing second creation keeps the first id
    let again = store
        .save_provider_customer(&alice, ProviderKind::Stripe, "cus_other")
        .await
        .unwrap();
    assert_eq!(again, customer);

    assert_eq!(
        store
            .find_by_provider_customer(ProviderKind::Stripe, &customer)
            .await
            .unwrap(),
        Some(alice)
    );
}

#[tokio::test]
async fn test_pg_duplicate_registration_rejected() {
    let Some(pool) = setup_test_db().await else { return };
    let store = PgStore::new(pool);
    let alice = seeded(&store, "alice", 0).await;

    let result = store
        .create_account(&Account::register(alice.clone(), "Again"))
        .await;
    assert!(matches!(
        result,
        Err(StoreError::Domain(DomainError::AccountAlreadyExists(_)))
    ));
}
