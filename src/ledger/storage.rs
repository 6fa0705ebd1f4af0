use std::fmt;
use std::path::Path;

use sled::{Db, Tree};
use thiserror::Error;

use super::account::Account;
use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Durable home for committed blocks and account registrations.
///
/// A write that returns `Ok` must survive a restart.
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Saves a committed block
    fn save_block(&self, block: &Block) -> Result<(), StorageError>;

    /// Gets all blocks in commit order
    fn get_all_blocks(&self) -> Result<Vec<Block>, StorageError>;

    /// Saves an account registration and its opening balance
    fn save_account(&self, account: &Account) -> Result<(), StorageError>;

    /// Gets all account registrations
    fn get_all_accounts(&self) -> Result<Vec<Account>, StorageError>;
}

/// sled-backed persistence for committed blocks, account registrations and
/// signing keys
pub struct LedgerStorage {
    db: Db,

    /// Blocks keyed by big-endian index, so iteration follows commit order
    blocks: Tree,

    /// Accounts keyed by `(address, currency)`
    accounts: Tree,
}

impl fmt::Debug for LedgerStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerStorage")
            .field("blocks", &self.blocks.len())
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

impl LedgerStorage {
    /// Opens (or creates) the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;

        let blocks = db.open_tree("blocks")?;
        let accounts = db.open_tree("accounts")?;

        Ok(Self { db, blocks, accounts })
    }

    /// Opens the tree that holds secret keys beside the ledger data
    pub fn key_tree(&self) -> Result<Tree, StorageError> {
        Ok(self.db.open_tree("keys")?)
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl LedgerStore for LedgerStorage {
    /// Saves a block and flushes it to disk
    fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let value = bincode::serialize(block)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.blocks.insert(block.index.to_be_bytes(), value)?;
        self.flush()
    }

    /// Gets all blocks in commit order
    fn get_all_blocks(&self) -> Result<Vec<Block>, StorageError> {
        self.blocks
            .iter()
            .map(|entry| {
                let (_, value) = entry?;
                bincode::deserialize::<Block>(&value)
                    .map_err(|e| StorageError::DeserializationError(e.to_string()))
            })
            .collect()
    }

    /// Saves an account registration and its opening balance
    fn save_account(&self, account: &Account) -> Result<(), StorageError> {
        let key = bincode::serialize(&(&account.address, &account.currency))
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let value = bincode::serialize(account)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.accounts.insert(key, value)?;
        self.flush()
    }

    /// Gets all account registrations
    fn get_all_accounts(&self) -> Result<Vec<Account>, StorageError> {
        self.accounts
            .iter()
            .map(|entry| {
                let (_, value) = entry?;
                bincode::deserialize::<Account>(&value)
                    .map_err(|e| StorageError::DeserializationError(e.to_string()))
            })
            .collect()
    }
}
