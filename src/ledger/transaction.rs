use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::crypto::{Address, DigitalSignature};

/// Errors that can occur while building a transaction
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// A transfer of `amount` units of `currency` between two addresses.
///
/// Immutable once created; it only becomes part of history when a block
/// containing it is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    /// Sender's address
    pub from: Address,

    /// Recipient's address
    pub to: Address,

    /// Currency namespace the amount is denominated in
    pub currency: String,

    /// Amount being transferred, finite and non-negative
    pub amount: f64,

    /// Sender's signature, attached at submission when the signer holds the key
    pub signature: Option<DigitalSignature>,

    /// Timestamp when the transaction was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a new unsigned transaction
    ///
    /// Fails with `InvalidAmount` if `amount` is negative, NaN or infinite.
    pub fn new(
        from: Address,
        to: Address,
        currency: impl Into<String>,
        amount: f64,
    ) -> Result<Self, TransactionError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(TransactionError::InvalidAmount(format!(
                "Amount must be a finite non-negative number: {}",
                amount
            )));
        }

        Ok(Transaction {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            currency: currency.into(),
            amount,
            signature: None,
            created_at: Utc::now(),
        })
    }

    /// Bytes covered by the sender's signature
    pub fn signing_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        let data = serde_json::json!({
            "id": self.id,
            "from": self.from.0,
            "to": self.to.0,
            "currency": self.currency,
            "amount": self.amount,
            "created_at": self.created_at,
        });

        serde_json::to_vec(&data).map_err(|e| TransactionError::SerializationError(e.to_string()))
    }

    /// Net effect of this transaction on `(address, currency)`.
    ///
    /// The debit is applied before the credit, so a self-transfer nets to
    /// exactly zero.
    pub fn apply_to(&self, balance: f64, address: &Address, currency: &str) -> f64 {
        if self.currency != currency {
            return balance;
        }

        let mut balance = balance;
        if &self.from == address {
            balance -= self.amount;
        }
        if &self.to == address {
            balance += self.amount;
        }
        balance
    }
}
