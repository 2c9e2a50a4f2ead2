//! In-memory wallet store
//!
//! Serializable by construction: a unit of work holds the single state lock
//! for its whole lifetime and records its writes separately; they reach the
//! shared state only on commit. Used by tests and by `STORE_BACKEND=memory`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AmountError, Balance, DomainError, LedgerEntry, NewLedgerEntry, ProviderKind,
};

use super::{
    AccountStore, Claim, Ledger, OperationKey, StoreError, StoreResult, UnitOfWork, WalletStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    provider_customers: HashMap<(AccountId, ProviderKind), String>,
    /// Append order; newest last
    entries: Vec<LedgerEntry>,
    operations: HashMap<(String, String), (Uuid, String)>,
}

/// In-memory implementation of [`WalletStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_ledger_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent ledger append fail with a persistence error.
    /// Lets tests observe that a failing unit of work leaves no partial effect.
    pub fn fail_ledger_writes(&self, fail: bool) {
        self.fail_ledger_writes.store(fail, Ordering::SeqCst);
    }

    /// Total number of ledger entries
    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.id) {
            return Err(DomainError::AccountAlreadyExists(account.id.to_string()).into());
        }
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn find_by_identity(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(id).cloned())
    }

    async fn get_balance(&self, id: &AccountId) -> StoreResult<Balance> {
        self.state
            .lock()
            .await
            .accounts
            .get(id)
            .map(|account| account.balance)
            .ok_or_else(|| DomainError::AccountNotFound(id.to_string()).into())
    }

    async fn provider_customer(
        &self,
        id: &AccountId,
        provider: ProviderKind,
    ) -> StoreResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .await
            .provider_customers
            .get(&(id.clone(), provider))
            .cloned())
    }

    async fn save_provider_customer(
        &self,
        id: &AccountId,
        provider: ProviderKind,
        customer_ref: &str,
    ) -> StoreResult<String> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(id) {
            return Err(DomainError::AccountNotFound(id.to_string()).into());
        }
        let stored = state
            .provider_customers
            .entry((id.clone(), provider))
            .or_insert_with(|| customer_ref.to_string());
        Ok(stored.clone())
    }

    async fn find_by_provider_customer(
        &self,
        provider: ProviderKind,
        customer_ref: &str,
    ) -> StoreResult<Option<AccountId>> {
        Ok(self
            .state
            .lock()
            .await
            .provider_customers
            .iter()
            .find(|((_, kind), stored)| *kind == provider && stored.as_str() == customer_ref)
            .map(|((id, _), _)| id.clone()))
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn list_for_account(&self, id: &AccountId) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .iter()
            .rev()
            .filter(|entry| entry.involves(id))
            .cloned()
            .collect())
    }

    async fn find_entry(&self, entry_id: Uuid) -> StoreResult<Option<LedgerEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .iter()
            .find(|entry| entry.id == entry_id)
            .cloned())
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged: StagedChanges::default(),
            fail_ledger_writes: self.fail_ledger_writes.load(Ordering::SeqCst),
        }))
    }
}

/// Writes of one unit of work, applied to the shared state on commit
#[derive(Debug, Default)]
struct StagedChanges {
    balances: HashMap<AccountId, Balance>,
    entries: Vec<LedgerEntry>,
    operations: HashMap<(String, String), (Uuid, String)>,
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: StagedChanges,
    fail_ledger_writes: bool,
}

impl MemoryUnitOfWork {
    fn current_balance(&self, id: &AccountId) -> Option<Balance> {
        self.staged
            .balances
            .get(id)
            .copied()
            .or_else(|| self.guard.accounts.get(id).map(|account| account.balance))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn adjust_balance(&mut self, id: &AccountId, delta: i64) -> StoreResult<Balance> {
        let balance = self
            .current_balance(id)
            .ok_or_else(|| DomainError::AccountNotFound(id.to_string()))?;

        let next = match balance.adjust(delta) {
            Ok(next) => next,
            Err(AmountError::Negative(_)) => {
                return Err(DomainError::insufficient_funds(
                    delta.saturating_neg(),
                    balance.minor_units(),
                )
                .into())
            }
            Err(e) => return Err(DomainError::from(e).into()),
        };
        self.staged.balances.insert(id.clone(), next);
        Ok(next)
    }

    async fn record(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry> {
        if self.fail_ledger_writes {
            return Err(StoreError::Persistence(
                "ledger writes are disabled".to_string(),
            ));
        }
        let entry = entry.into_entry(Utc::now());
        self.staged.entries.push(entry.clone());
        Ok(entry)
    }

    async fn claim_operation(&mut self, key: &OperationKey, entry_id: Uuid) -> StoreResult<Claim> {
        let slot = (key.scope.clone(), key.key.clone());
        let existing = self
            .staged
            .operations
            .get(&slot)
            .or_else(|| self.guard.operations.get(&slot));
        if let Some((existing, fingerprint)) = existing {
            return Ok(Claim::Existing {
                entry_id: *existing,
                fingerprint: fingerprint.clone(),
            });
        }
        self.staged
            .operations
            .insert(slot, (entry_id, key.fingerprint.clone()));
        Ok(Claim::Fresh)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        let state = &mut *guard;
        for (id, balance) in staged.balances {
            if let Some(account) = state.accounts.get_mut(&id) {
                account.balance = balance;
            }
        }
        state.entries.extend(staged.entries);
        state.operations.extend(staged.operations);
        Ok(())
    }
}
