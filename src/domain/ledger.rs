//! Ledger entries
//!
//! Immutable records of completed fund movements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::account::AccountId;
use super::amount::Amount;
use super::deposit::ProviderKind;
use super::error::DomainError;

/// Sentinel party name for money entering the wallet from outside.
pub const EXTERNAL_PARTY: &str = "external";

/// One side of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Party {
    Account(AccountId),
    External,
}

impl Party {
    pub fn is_account(&self, id: &AccountId) -> bool {
        matches!(self, Party::Account(account) if account == id)
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Account(id) => f.write_str(id.as_str()),
            Party::External => f.write_str(EXTERNAL_PARTY),
        }
    }
}

impl FromStr for Party {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == EXTERNAL_PARTY {
            Ok(Party::External)
        } else {
            AccountId::parse(s).map(Party::Account)
        }
    }
}

impl TryFrom<String> for Party {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Party> for String {
    fn from(party: Party) -> Self {
        party.to_string()
    }
}

/// Ledger entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Success,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Success => "success",
            EntryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "success" => Ok(EntryStatus::Success),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown entry status: {other}"
            ))),
        }
    }
}

/// Provider details attached to deposit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReference {
    pub provider: ProviderKind,
    pub transaction_id: String,
}

/// An entry about to be appended. The id is chosen by the caller so that
/// idempotency claims can point at it inside the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub id: Uuid,
    pub amount: Amount,
    pub sender: Party,
    pub receiver: Party,
    pub description: String,
    pub status: EntryStatus,
    pub provider: Option<ProviderReference>,
}

impl NewLedgerEntry {
    /// Entry for a completed peer-to-peer transfer.
    pub fn transfer(
        sender: AccountId,
        receiver: AccountId,
        amount: Amount,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            sender: Party::Account(sender),
            receiver: Party::Account(receiver),
            description: description.into(),
            status: EntryStatus::Success,
            provider: None,
        }
    }

    /// Entry for a confirmed external deposit.
    pub fn deposit(
        receiver: AccountId,
        amount: Amount,
        description: impl Into<String>,
        provider: ProviderReference,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            sender: Party::External,
            receiver: Party::Account(receiver),
            description: description.into(),
            status: EntryStatus::Success,
            provider: Some(provider),
        }
    }

    pub fn into_entry(self, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            amount: self.amount,
            sender: self.sender,
            receiver: self.receiver,
            description: self.description,
            status: self.status,
            provider: self.provider,
            created_at,
        }
    }
}

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub amount: Amount,
    pub sender: Party,
    pub receiver: Party,
    pub description: String,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderReference>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// True when the account is either side of this entry.
    pub fn involves(&self, id: &AccountId) -> bool {
        self.sender.is_account(id) || self.receiver.is_account(id)
    }
}
