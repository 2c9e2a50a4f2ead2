//! Domain module
//!
//! Core domain types and business rules.

pub mod account;
pub mod amount;
pub mod context;
pub mod currency;
pub mod deposit;
pub mod error;
pub mod ledger;

pub use account::{Account, AccountId};
pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use currency::Currency;
pub use deposit::{AmountUnit, CustomerRef, DepositConfirmation, GrossAmount, ProviderKind};
pub use error::DomainError;
pub use ledger::{EntryStatus, LedgerEntry, NewLedgerEntry, Party, ProviderReference, EXTERNAL_PARTY};
