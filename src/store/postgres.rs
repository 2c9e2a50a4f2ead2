//! PostgreSQL wallet store
//!
//! Balance changes are a single conditional `UPDATE ... WHERE balance + $2 >= 0`
//! so the check and the write cannot be separated by a concurrent debit. The
//! updated row stays locked until the surrounding transaction ends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Amount, Balance, DomainError, EntryStatus, LedgerEntry, NewLedgerEntry,
    Party, ProviderKind, ProviderReference,
};

use super::{
    AccountStore, Claim, Ledger, OperationKey, StoreError, StoreResult, UnitOfWork, WalletStore,
};

type LedgerRow = (
    Uuid,
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

const LEDGER_COLUMNS: &str = r#"
    id, amount, sender, receiver, description, status,
    provider, provider_transaction_id, created_at
"#;

/// PostgreSQL implementation of [`WalletStore`]
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {err}"))
}

fn entry_from_row(row: LedgerRow) -> StoreResult<LedgerEntry> {
    let (id, amount, sender, receiver, description, status, provider, provider_txn, created_at) =
        row;

    let provider = match (provider, provider_txn) {
        (Some(provider), Some(transaction_id)) => Some(ProviderReference {
            provider: provider
                .parse::<ProviderKind>()
                .map_err(|e| corrupt("ledger provider", e))?,
            transaction_id,
        }),
        _ => None,
    };

    Ok(LedgerEntry {
        id,
        amount: Amount::new(amount).map_err(|e| corrupt("ledger amount", e))?,
        sender: sender.parse::<Party>().map_err(|e| corrupt("ledger sender", e))?,
        receiver: receiver
            .parse::<Party>()
            .map_err(|e| corrupt("ledger receiver", e))?,
        description,
        status: status
            .parse::<EntryStatus>()
            .map_err(|e| corrupt("ledger status", e))?,
        provider,
        created_at,
    })
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (identity, name, balance, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account.id.as_str())
        .bind(&account.name)
        .bind(account.balance.minor_units())
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::from_constraint(
                e,
                DomainError::AccountAlreadyExists(account.id.to_string()),
                DomainError::AccountNotFound(account.id.to_string()),
            )
        })?;

        Ok(())
    }

    async fn find_by_identity(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        let row: Option<(String, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT name, balance, created_at
            FROM accounts
            WHERE identity = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(name, balance, created_at)| {
            Ok(Account {
                id: id.clone(),
                name,
                balance: Balance::new(balance).map_err(|e| corrupt("account balance", e))?,
                created_at,
            })
        })
        .transpose()
    }

    async fn get_balance(&self, id: &AccountId) -> StoreResult<Balance> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE identity = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let balance = balance.ok_or_else(|| DomainError::AccountNotFound(id.to_string()))?;
        Balance::new(balance).map_err(|e| corrupt("account balance", e))
    }

    async fn provider_customer(
        &self,
        id: &AccountId,
        provider: ProviderKind,
    ) -> StoreResult<Option<String>> {
        let customer: Option<String> = sqlx::query_scalar(
            r#"
            SELECT customer_ref FROM provider_customers
            WHERE account_identity = $1 AND provider = $2
            "#,
        )
        .bind(id.as_str())
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn save_provider_customer(
        &self,
        id: &AccountId,
        provider: ProviderKind,
        customer_ref: &str,
    ) -> StoreResult<String> {
        sqlx::query(
            r#"
            INSERT INTO provider_customers (account_identity, provider, customer_ref)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_identity, provider) DO NOTHING
            "#,
        )
        .bind(id.as_str())
        .bind(provider.as_str())
        .bind(customer_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::from_constraint(
                e,
                DomainError::validation(format!(
                    "{provider} customer {customer_ref} belongs to another account"
                )),
                DomainError::AccountNotFound(id.to_string()),
            )
        })?;

        self.provider_customer(id, provider)
            .await?
            .ok_or_else(|| StoreError::Persistence("provider customer was not stored".to_string()))
    }

    async fn find_by_provider_customer(
        &self,
        provider: ProviderKind,
        customer_ref: &str,
    ) -> StoreResult<Option<AccountId>> {
        let identity: Option<String> = sqlx::query_scalar(
            r#"
            SELECT account_identity FROM provider_customers
            WHERE provider = $1 AND customer_ref = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(customer_ref)
        .fetch_optional(&self.pool)
        .await?;

        identity
            .map(|identity| AccountId::parse(&identity).map_err(|e| corrupt("account identity", e)))
            .transpose()
    }
}

#[async_trait]
impl Ledger for PgStore {
    async fn list_for_account(&self, id: &AccountId) -> StoreResult<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM ledger_entries
            WHERE sender = $1 OR receiver = $1
            ORDER BY seq DESC
            "#
        ))
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn find_entry(&self, entry_id: Uuid) -> StoreResult<Option<LedgerEntry>> {
        let row: Option<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(entry_from_row).transpose()
    }
}

#[async_trait]
impl WalletStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// A database transaction; rolled back by sqlx when dropped uncommitted.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn adjust_balance(&mut self, id: &AccountId, delta: i64) -> StoreResult<Balance> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance = balance + $2, updated_at = NOW()
            WHERE identity = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(id.as_str())
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(balance) = updated {
            return Balance::new(balance).map_err(|e| corrupt("account balance", e));
        }

        // Distinguish a missing account from a refused debit
        let available: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE identity = $1")
                .bind(id.as_str())
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            Some(available) => {
                Err(DomainError::insufficient_funds(delta.saturating_neg(), available).into())
            }
            None => Err(DomainError::AccountNotFound(id.to_string()).into()),
        }
    }

    async fn record(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry> {
        let (provider, provider_txn) = match &entry.provider {
            Some(reference) => (
                Some(reference.provider.as_str()),
                Some(reference.transaction_id.as_str()),
            ),
            None => (None, None),
        };

        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO ledger_entries (
                id, amount, sender, receiver, description, status,
                provider, provider_transaction_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING created_at
            "#,
        )
        .bind(entry.id)
        .bind(entry.amount.minor_units())
        .bind(entry.sender.to_string())
        .bind(entry.receiver.to_string())
        .bind(&entry.description)
        .bind(entry.status.as_str())
        .bind(provider)
        .bind(provider_txn)
        .fetch_one(&mut *self.tx)
        .await?;

        tracing::debug!(
            entry_id = %entry.id,
            sender = %entry.sender,
            receiver = %entry.receiver,
            amount = entry.amount.minor_units(),
            "Ledger entry recorded"
        );

        Ok(entry.into_entry(created_at))
    }

    async fn claim_operation(&mut self, key: &OperationKey, entry_id: Uuid) -> StoreResult<Claim> {
        // A concurrent claimant blocks on the unique index until the first
        // transaction ends, then sees its committed row.
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO processed_operations (scope, key, fingerprint, ledger_entry_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (scope, key) DO NOTHING
            RETURNING ledger_entry_id
            "#,
        )
        .bind(&key.scope)
        .bind(&key.key)
        .bind(&key.fingerprint)
        .bind(entry_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        if inserted.is_some() {
            return Ok(Claim::Fresh);
        }

        let (entry_id, fingerprint): (Uuid, String) = sqlx::query_as(
            r#"
            SELECT ledger_entry_id, fingerprint
            FROM processed_operations
            WHERE scope = $1 AND key = $2
            "#,
        )
        .bind(&key.scope)
        .bind(&key.key)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Claim::Existing {
            entry_id,
            fingerprint,
        })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
