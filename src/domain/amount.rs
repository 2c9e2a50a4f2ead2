//! Amount type
//!
//! Domain primitive for monetary amounts with business rule validation.
//! The ledger stores every amount as an integer count of the currency's
//! minor unit (cents for NZD), so no floating-point value ever reaches a
//! balance. All amounts are validated at construction time, ensuring invalid
//! values cannot exist in the system.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum allowed amount or balance in minor units (1 trillion major units at exponent 2)
const MAX_MINOR_UNITS: i64 = 100_000_000_000_000;

/// Amount represents a validated, strictly positive monetary value in minor units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Value never exceeds `MAX_MINOR_UNITS`
///
/// # Example
/// ```
/// use wallet_ledger::domain::Amount;
///
/// let amount = Amount::new(30_000).unwrap();
/// assert_eq!(amount.minor_units(), 30_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has more precision than the currency allows (max {exponent} decimal places, got {scale})")]
    TooManyDecimals { scale: u32, exponent: u32 },

    #[error("Amount exceeds maximum allowed value ({MAX_MINOR_UNITS} minor units)")]
    Overflow,

    #[error("Balance cannot be negative (got {0})")]
    Negative(i64),
}

impl Amount {
    /// Create a new Amount from minor units with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::Overflow` if value exceeds the maximum
    pub fn new(minor_units: i64) -> Result<Self, AmountError> {
        if minor_units <= 0 {
            return Err(AmountError::NotPositive(Decimal::from(minor_units)));
        }
        if minor_units > MAX_MINOR_UNITS {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor_units))
    }

    /// Create an Amount from a major-unit decimal (e.g. `12.50` NZD) using the
    /// currency exponent. Precision finer than one minor unit is rejected, never rounded.
    pub fn from_major(value: Decimal, exponent: u32) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        let factor = 10i64
            .checked_pow(exponent)
            .map(Decimal::from)
            .ok_or(AmountError::Overflow)?;
        let scaled = value.checked_mul(factor).ok_or(AmountError::Overflow)?;
        if !scaled.fract().is_zero() {
            return Err(AmountError::TooManyDecimals {
                scale: value.normalize().scale(),
                exponent,
            });
        }
        let minor = scaled.trunc().to_i64().ok_or(AmountError::Overflow)?;
        Self::new(minor)
    }

    /// Create an Amount from a decimal already expressed in minor units.
    /// Fractional minor units are rejected.
    pub fn from_minor_decimal(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        if !value.fract().is_zero() {
            return Err(AmountError::TooManyDecimals {
                scale: value.normalize().scale(),
                exponent: 0,
            });
        }
        let minor = value.trunc().to_i64().ok_or(AmountError::Overflow)?;
        Self::new(minor)
    }

    /// Get the value in minor units.
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Express the amount in major units for display or provider requests.
    pub fn to_major(&self, exponent: u32) -> Decimal {
        Decimal::new(self.0, exponent)
    }

    /// Negated value, for use as a debit delta.
    pub fn as_debit(&self) -> i64 {
        -self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents an account balance (zero or positive) in minor units.
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(minor_units: i64) -> Result<Self, AmountError> {
        if minor_units < 0 {
            return Err(AmountError::Negative(minor_units));
        }
        if minor_units > MAX_MINOR_UNITS {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor_units))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(0)
    }

    /// Get the value in minor units
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Apply a signed delta, refusing to go below zero.
    pub fn adjust(&self, delta: i64) -> Result<Balance, AmountError> {
        let next = self.0.checked_add(delta).ok_or(AmountError::Overflow)?;
        Balance::new(next)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<i64> for Balance {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for i64 {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(100);
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().minor_units(), 100);
    }

    #[test]
    fn test_amount_zero_rejected() {
        assert!(matches!(Amount::new(0), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        assert!(matches!(Amount::new(-100), Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_overflow() {
        assert!(matches!(
            Amount::new(MAX_MINOR_UNITS + 1),
            Err(AmountError::Overflow)
        ));
        assert!(Amount::new(MAX_MINOR_UNITS).is_ok());
    }

    #[test]
    fn test_amount_from_major() {
        let amount = Amount::from_major(dec!(12.50), 2).unwrap();
        assert_eq!(amount.minor_units(), 1250);

        let yen = Amount::from_major(dec!(500), 0).unwrap();
        assert_eq!(yen.minor_units(), 500);
    }

    #[test]
    fn test_amount_from_major_too_precise() {
        let result = Amount::from_major(dec!(0.125), 2);
        assert!(matches!(
            result,
            Err(AmountError::TooManyDecimals { scale: 3, exponent: 2 })
        ));
    }

    #[test]
    fn test_amount_from_minor_decimal_rejects_fraction() {
        assert!(Amount::from_minor_decimal(dec!(1999)).is_ok());
        assert!(matches!(
            Amount::from_minor_decimal(dec!(19.5)),
            Err(AmountError::TooManyDecimals { .. })
        ));
    }

    #[test]
    fn test_amount_to_major() {
        let amount = Amount::new(1250).unwrap();
        assert_eq!(amount.to_major(2), dec!(12.50));
    }

    #[test]
    fn test_amount_serde_as_integer() {
        let amount = Amount::new(300).unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "300");
        let parsed: Result<Amount, _> = serde_json::from_str("-5");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_balance_adjust() {
        let balance = Balance::zero().adjust(100).unwrap();
        assert_eq!(balance.minor_units(), 100);
        assert_eq!(balance.adjust(-30).unwrap().minor_units(), 70);
    }

    #[test]
    fn test_balance_adjust_refuses_negative() {
        let balance = Balance::new(50).unwrap();
        assert!(matches!(balance.adjust(-100), Err(AmountError::Negative(-50))));
        assert!(matches!(
            Balance::new(MAX_MINOR_UNITS).unwrap().adjust(1),
            Err(AmountError::Overflow)
        ));
    }
}
