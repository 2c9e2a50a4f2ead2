//! Deposit confirmations
//!
//! Provider-neutral description of an external payment that a provider has
//! confirmed, plus the normalization rules that turn provider amounts into
//! ledger minor units.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::account::AccountId;
use super::amount::Amount;
use super::currency::Currency;
use super::error::DomainError;

/// Supported payment providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Stripe,
    Flutterwave,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stripe => "stripe",
            ProviderKind::Flutterwave => "flutterwave",
        }
    }

    /// Ledger description used for deposits through this provider.
    pub fn deposit_description(&self) -> &'static str {
        match self {
            ProviderKind::Stripe => "Stripe Deposit",
            ProviderKind::Flutterwave => "Flutterwave Deposit",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(ProviderKind::Stripe),
            "flutterwave" => Ok(ProviderKind::Flutterwave),
            other => Err(DomainError::validation(format!("unknown provider: {other}"))),
        }
    }
}

/// Which unit a provider reports its amounts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountUnit {
    /// Smallest currency unit (Stripe `amount_subtotal`)
    Minor,
    /// Whole currency unit with decimals (Flutterwave `amount`)
    Major,
}

/// An amount exactly as a provider reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrossAmount {
    pub value: Decimal,
    pub unit: AmountUnit,
    pub currency: Currency,
}

impl GrossAmount {
    /// Convert into ledger minor units of the wallet currency.
    pub fn normalize(&self, wallet_currency: &Currency) -> Result<Amount, DomainError> {
        if &self.currency != wallet_currency {
            return Err(DomainError::CurrencyMismatch {
                expected: wallet_currency.to_string(),
                actual: self.currency.to_string(),
            });
        }
        let amount = match self.unit {
            AmountUnit::Minor => Amount::from_minor_decimal(self.value)?,
            AmountUnit::Major => Amount::from_major(self.value, self.currency.exponent())?,
        };
        Ok(amount)
    }
}

/// How a confirmation identifies the paying customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerRef {
    /// Opaque provider customer id, resolved through stored provider customers
    ProviderCustomer(String),
    /// Provider echoed our own account identity (customer email)
    Identity(AccountId),
}

/// A payment the provider has confirmed as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositConfirmation {
    pub provider: ProviderKind,
    /// Provider transaction id; the deduplication key for reconciliation
    pub provider_transaction_id: String,
    pub customer: CustomerRef,
    pub gross: GrossAmount,
    pub description: String,
}
