//! Currency
//!
//! ISO currency code plus the minor-unit exponent used to normalize provider
//! amounts into ledger minor units.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::DomainError;

/// Currencies whose smallest unit is the major unit (no cents).
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

/// A lower-cased three-letter currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, DomainError> {
        let code = code.trim().to_ascii_lowercase();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(DomainError::Validation(format!(
                "invalid currency code: {code:?}"
            )));
        }
        Ok(Self(code))
    }

    /// New Zealand dollar, the default wallet currency
    pub fn nzd() -> Self {
        Self("nzd".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal places between the major and minor unit.
    pub fn exponent(&self) -> u32 {
        if ZERO_DECIMAL_CURRENCIES.contains(&self.0.as_str()) {
            0
        } else {
            2
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}
