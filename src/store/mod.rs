//! Wallet Store module
//!
//! Persistence contracts for account balances and the ledger, with a
//! PostgreSQL implementation and an in-memory implementation.
//!
//! Every balance mutation goes through [`UnitOfWork::adjust_balance`], a
//! conditional update that refuses to take a balance below zero. A unit of
//! work that is dropped without [`UnitOfWork::commit`] leaves no trace.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Account, AccountId, Balance, LedgerEntry, NewLedgerEntry, ProviderKind};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store-wide Result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Key under which an operation may be applied at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    /// Namespace: provider name for deposits, `transfer:<sender>` for transfers
    pub scope: String,
    pub key: String,
    /// Hash of the request body that first used this key
    pub fingerprint: String,
}

impl OperationKey {
    /// Deduplication key for a provider transaction
    pub fn provider_transaction(
        provider: ProviderKind,
        transaction_id: &str,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            scope: provider.as_str().to_string(),
            key: transaction_id.to_string(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Client-supplied idempotency key for a transfer, scoped to the sender
    pub fn client_transfer(
        sender: &AccountId,
        key: &str,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            scope: format!("transfer:{sender}"),
            key: key.to_string(),
            fingerprint: fingerprint.into(),
        }
    }
}

/// Result of claiming an operation key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// First use of the key; the caller proceeds with the mutation
    Fresh,
    /// The key was already applied and points at this ledger entry
    Existing { entry_id: Uuid, fingerprint: String },
}

/// Account directory and balance reads
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Register a new account (balance 0)
    async fn create_account(&self, account: &Account) -> StoreResult<()>;

    async fn find_by_identity(&self, id: &AccountId) -> StoreResult<Option<Account>>;

    /// Current balance; `AccountNotFound` when the account does not exist
    async fn get_balance(&self, id: &AccountId) -> StoreResult<Balance>;

    /// Stored provider customer id for an account, if any
    async fn provider_customer(
        &self,
        id: &AccountId,
        provider: ProviderKind,
    ) -> StoreResult<Option<String>>;

    /// Persist a provider customer id unless one already exists, and return
    /// whichever id is stored afterwards.
    async fn save_provider_customer(
        &self,
        id: &AccountId,
        provider: ProviderKind,
        customer_ref: &str,
    ) -> StoreResult<String>;

    /// Reverse lookup used by webhook reconciliation
    async fn find_by_provider_customer(
        &self,
        provider: ProviderKind,
        customer_ref: &str,
    ) -> StoreResult<Option<AccountId>>;
}

/// Append-only ledger reads
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Entries where the account is sender or receiver, newest first
    async fn list_for_account(&self, id: &AccountId) -> StoreResult<Vec<LedgerEntry>>;

    async fn find_entry(&self, entry_id: Uuid) -> StoreResult<Option<LedgerEntry>>;
}

/// A single atomic unit of balance mutations and ledger appends.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Apply `delta` minor units to a balance; fails with `InsufficientFunds`
    /// instead of going negative and `AccountNotFound` for unknown accounts.
    async fn adjust_balance(&mut self, id: &AccountId, delta: i64) -> StoreResult<Balance>;

    /// Append a ledger entry
    async fn record(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry>;

    /// Claim an operation key for the entry about to be recorded
    async fn claim_operation(&mut self, key: &OperationKey, entry_id: Uuid) -> StoreResult<Claim>;

    /// Make every change of this unit visible at once
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Full wallet persistence: accounts, ledger, and atomic units of work.
#[async_trait]
pub trait WalletStore: AccountStore + Ledger {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// Standalone atomic balance adjustment
    async fn adjust_balance(&self, id: &AccountId, delta: i64) -> StoreResult<Balance> {
        let mut unit = self.begin().await?;
        let balance = unit.adjust_balance(id, delta).await?;
        unit.commit().await?;
        Ok(balance)
    }

    /// Standalone ledger append
    async fn record(&self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry> {
        let mut unit = self.begin().await?;
        let entry = unit.record(entry).await?;
        unit.commit().await?;
        Ok(entry)
    }
}
