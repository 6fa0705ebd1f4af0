use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::sync::Arc;

use super::crypto::Address;

/// Errors that can occur during account operations
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account not found: {address} has no {currency} registration")]
    AccountNotFound { address: String, currency: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// A registered `(address, currency)` pair and the balance it was seeded with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    /// The account's address
    pub address: Address,

    /// Currency namespace of the registration
    pub currency: String,

    /// Balance seeded outside of transaction history
    pub opening_balance: f64,
}

impl Account {
    pub fn new(address: Address, currency: impl Into<String>) -> Self {
        Account {
            address,
            currency: currency.into(),
            opening_balance: 0.0,
        }
    }

    /// Increases the opening balance
    pub fn deposit(&mut self, amount: f64) -> Result<(), AccountError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AccountError::InvalidAmount(format!(
                "Amount must be positive: {}",
                amount
            )));
        }

        self.opening_balance += amount;
        Ok(())
    }
}

type AccountKey = (Address, String);

/// Registered addresses per currency and their opening balances.
///
/// Presence of an entry is what makes an address a known sender for that
/// currency.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: Arc<DashMap<AccountKey, Account>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        AccountRegistry {
            accounts: Arc::new(DashMap::new()),
        }
    }

    /// Registers `(address, currency)` with a zero opening balance.
    ///
    /// Returns false and leaves the existing entry alone if it was already
    /// registered.
    pub fn register(&self, address: &Address, currency: &str) -> bool {
        match self.accounts.entry((address.clone(), currency.to_string())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Account::new(address.clone(), currency));
                true
            }
        }
    }

    pub fn is_registered(&self, address: &Address, currency: &str) -> bool {
        self.accounts
            .contains_key(&(address.clone(), currency.to_string()))
    }

    /// Opening balance of `(address, currency)`, 0 if never registered
    pub fn opening_balance(&self, address: &Address, currency: &str) -> f64 {
        self.accounts
            .get(&(address.clone(), currency.to_string()))
            .map(|account| account.opening_balance)
            .unwrap_or(0.0)
    }

    /// Applies `change` to a copy of the account and stores the copy only if
    /// `change` succeeds. The entry stays locked for the duration, so
    /// concurrent updates of the same account are serialized.
    pub fn update<E, F>(&self, address: &Address, currency: &str, change: F) -> Result<Account, E>
    where
        E: From<AccountError>,
        F: FnOnce(&mut Account) -> Result<(), E>,
    {
        let key = (address.clone(), currency.to_string());
        let mut entry = self.accounts.get_mut(&key).ok_or_else(|| AccountError::AccountNotFound {
            address: address.0.clone(),
            currency: currency.to_string(),
        })?;

        let mut account = entry.clone();
        change(&mut account)?;
        *entry = account.clone();

        Ok(account)
    }

    /// Inserts or replaces an account, used when reloading from storage
    pub fn restore(&self, account: Account) {
        let key = (account.address.clone(), account.currency.clone());
        self.accounts.insert(key, account);
    }

    /// All registrations for `currency`
    pub fn accounts_for(&self, currency: &str) -> Vec<Account> {
        self.accounts
            .iter()
            .filter(|entry| entry.key().1 == currency)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Gets all accounts
    pub fn get_all_accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(|entry| entry.value().clone()).collect()
    }
}
