//! Command definitions
//!
//! Commands represent intentions to change the system state; results are
//! what handlers hand back to the API layer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{Account, Amount, Balance, LedgerEntry};

// =========================================================================
// RegisterAccountCommand
// =========================================================================

/// Command to register the caller's wallet account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAccountCommand {
    /// Display name shown to people sending money to this account
    pub name: String,
}

impl RegisterAccountCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// =========================================================================
// TransferCommand
// =========================================================================

/// Command to move money from the caller to another account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    /// Receiver identity (email)
    pub receiver: String,
    /// Amount in minor units of the wallet currency
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferCommand {
    pub fn new(receiver: impl Into<String>, amount: Amount) -> Self {
        Self {
            receiver: receiver.into(),
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Ledger description, defaulting when the caller gave none
    pub fn description(&self) -> String {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("Transfer")
            .to_string()
    }

    /// Stable hash of the request, compared when an idempotency key is reused
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.receiver.trim().to_lowercase().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.amount.minor_units().to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.description().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Result of a transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub entry: LedgerEntry,
    /// Sender balance right after this transfer; absent on an idempotent replay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_balance: Option<Balance>,
    /// True when an earlier transfer with the same idempotency key was returned
    pub replayed: bool,
}

// =========================================================================
// VerifyAccountCommand
// =========================================================================

/// Command to look up a transfer receiver before sending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyAccountCommand {
    pub identity: String,
}

/// Public view of another account: enough to confirm the receiver, no balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub identity: String,
    pub name: String,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            identity: account.id.to_string(),
            name: account.name.clone(),
        }
    }
}

// =========================================================================
// CheckoutCommand
// =========================================================================

/// Command to start a deposit through a hosted provider checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutCommand {
    /// Amount in minor units of the wallet currency
    pub amount: Amount,
}

impl CheckoutCommand {
    pub fn new(amount: Amount) -> Self {
        Self { amount }
    }
}

// =========================================================================
// DepositOutcome
// =========================================================================

/// Result of reconciling one provider confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositOutcome {
    pub entry: LedgerEntry,
    /// False when the provider transaction had already been credited
    pub newly_credited: bool,
}

/// What a webhook delivery amounted to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Credited(DepositOutcome),
    /// Authentic delivery whose transaction the provider does not confirm
    NotConfirmed { status: String },
    /// Authentic event of a type that moves no money
    Ignored { event_type: String },
}

/// Query parameters Flutterwave appends to the redirect URL
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlutterwaveRedirect {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tx_ref: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}
