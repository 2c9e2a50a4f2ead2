//! Transfer Handler
//!
//! Moves money between two wallet accounts. The debit, the credit and the
//! ledger entry are one unit of work: either all three happen or none does.

use std::sync::Arc;

use crate::domain::{AccountId, DomainError, NewLedgerEntry, OperationContext};
use crate::error::AppError;
use crate::store::{Claim, OperationKey, WalletStore};

use super::account_handler::require_caller;
use super::{TransferCommand, TransferResult};

/// Longest accepted client idempotency key
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Handler for peer-to-peer transfers
pub struct TransferHandler {
    store: Arc<dyn WalletStore>,
}

impl TransferHandler {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    /// Execute the transfer command on behalf of the caller
    pub async fn execute(
        &self,
        command: TransferCommand,
        idempotency_key: Option<&str>,
        context: &OperationContext,
    ) -> Result<TransferResult, AppError> {
        let sender = require_caller(context)?.clone();
        let receiver = AccountId::parse(&command.receiver)?;

        if sender == receiver {
            return Err(DomainError::SameAccountTransfer.into());
        }

        let operation = match idempotency_key {
            Some(key) => Some(operation_key(&sender, key, &command)?),
            None => None,
        };

        // Both parties must exist before anything is locked
        for party in [&sender, &receiver] {
            if self.store.find_by_identity(party).await?.is_none() {
                return Err(DomainError::AccountNotFound(party.to_string()).into());
            }
        }

        let amount = command.amount;
        let entry = NewLedgerEntry::transfer(
            sender.clone(),
            receiver.clone(),
            amount,
            command.description(),
        );

        let mut unit = self.store.begin().await?;

        if let Some(operation) = &operation {
            let claim = unit.claim_operation(operation, entry.id).await?;
            if let Claim::Existing {
                entry_id,
                fingerprint,
            } = claim
            {
                // Release the unit before reading; the claim row is already committed
                drop(unit);
                if fingerprint != operation.fingerprint {
                    return Err(AppError::IdempotencyConflict);
                }
                let original = self
                    .store
                    .find_entry(entry_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!("claimed entry {entry_id} is missing"))
                    })?;
                tracing::info!(
                    sender = %sender,
                    entry_id = %entry_id,
                    "Transfer replayed from idempotency key"
                );
                return Ok(TransferResult {
                    entry: original,
                    sender_balance: None,
                    replayed: true,
                });
            }
        }

        // Lock balance rows in identity order so opposing transfers cannot deadlock
        let sender_balance = if sender < receiver {
            let balance = unit.adjust_balance(&sender, amount.as_debit()).await?;
            unit.adjust_balance(&receiver, amount.minor_units()).await?;
            balance
        } else {
            unit.adjust_balance(&receiver, amount.minor_units()).await?;
            unit.adjust_balance(&sender, amount.as_debit()).await?
        };

        let recorded = unit.record(entry).await?;
        unit.commit().await?;

        tracing::info!(
            entry_id = %recorded.id,
            sender = %sender,
            receiver = %receiver,
            amount = amount.minor_units(),
            correlation_id = ?context.correlation_id,
            client_ip = ?context.client_ip,
            "Transfer completed"
        );

        Ok(TransferResult {
            entry: recorded,
            sender_balance: Some(sender_balance),
            replayed: false,
        })
    }
}

fn operation_key(
    sender: &AccountId,
    key: &str,
    command: &TransferCommand,
) -> Result<OperationKey, AppError> {
    let key = key.trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Idempotency-Key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(OperationKey::client_transfer(
        sender,
        key,
        command.fingerprint(),
    ))
}
