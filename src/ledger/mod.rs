// Ledger module
//
// This module contains the wallet ledger implementation including:
// - Transaction and block structures
// - Address registrations and opening balances
// - Balance computation (full replay and incremental index)
// - Key generation and signing collaborators
// - Persistent storage

pub mod account;
pub mod balance;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use account::{Account, AccountError};
pub use balance::BalanceStrategy;
pub use block::{Block, BlockSummary};
pub use chain::{AccountBalance, Ledger, LedgerError};
pub use crypto::{Address, CryptoError, DigitalSignature, KeyGenerator, Keyring, Signer};
pub use storage::{LedgerStorage, LedgerStore, StorageError};
pub use transaction::{Transaction, TransactionError};
