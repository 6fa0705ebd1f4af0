use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::account::{Account, AccountError, AccountRegistry};
use super::balance::{replay_net, BalanceIndex, BalanceStrategy};
use super::block::{Block, BlockSummary, GENESIS_PREVIOUS_HASH};
use super::crypto::{Address, CryptoError, KeyGenerator, Keyring, Signer};
use super::storage::{LedgerStorage, LedgerStore, StorageError};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Account error: {0}")]
    AccountError(#[from] AccountError),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction { id: String, reason: String },

    #[error("Pending transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

/// Balance of one address in one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountBalance {
    pub address: Address,
    pub currency: String,
    pub balance: f64,
}

/// Consistent view of committed history and the pending pool
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub blocks: Vec<Block>,
    pub pending: Vec<Transaction>,
}

/// Committed history together with its balance index.
///
/// Both live behind one lock so the index never lags the blocks.
#[derive(Debug, Default)]
struct ChainState {
    blocks: Vec<Block>,
    index: BalanceIndex,
}

impl ChainState {
    fn from_blocks(blocks: Vec<Block>) -> Self {
        let index = BalanceIndex::from_blocks(&blocks);
        ChainState { blocks, index }
    }

    /// The only place committed history grows
    fn append_block(&mut self, block: Block) {
        self.index.apply_block(&block);
        self.blocks.push(block);
    }
}

/// Multi-currency ledger: opening balances plus an append-only chain of
/// blocks, fed by a pool of pending transactions.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct Ledger {
    /// Committed blocks and the incremental balance index
    chain: Arc<RwLock<ChainState>>,

    /// Pending transactions to be included in the next block
    pending_transactions: Arc<Mutex<Vec<Transaction>>>,

    /// Registered addresses and opening balances
    accounts: AccountRegistry,

    key_generator: Arc<dyn KeyGenerator>,

    signer: Arc<dyn Signer>,

    /// How `balance_of` computes balances
    strategy: BalanceStrategy,

    /// Storage for ledger data
    storage: Option<Arc<dyn LedgerStore>>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("blocks", &self.len())
            .field("pending", &self.lock_pending().len())
            .field("strategy", &self.strategy)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Ledger {
    /// Creates an empty in-memory ledger
    pub fn new(key_generator: Arc<dyn KeyGenerator>, signer: Arc<dyn Signer>) -> Self {
        Ledger {
            chain: Arc::new(RwLock::new(ChainState::default())),
            pending_transactions: Arc::new(Mutex::new(Vec::new())),
            accounts: AccountRegistry::new(),
            key_generator,
            signer,
            strategy: BalanceStrategy::default(),
            storage: None,
        }
    }

    /// Creates an in-memory ledger that generates and signs with `keyring`
    pub fn with_keyring(keyring: Arc<Keyring>) -> Self {
        Ledger::new(keyring.clone(), keyring)
    }

    /// Opens a ledger persisted at `storage_path` together with the keyring
    /// stored beside it, reloading committed blocks, account registrations
    /// and signing keys found there.
    pub fn open<P: AsRef<Path>>(storage_path: P) -> Result<(Self, Arc<Keyring>), LedgerError> {
        let storage = LedgerStorage::new(storage_path)?;
        let keyring = Arc::new(Keyring::with_tree(storage.key_tree()?)?);
        info!("Loaded {} signing keys from storage", keyring.len());

        let ledger = Ledger::from_store(Arc::new(storage), keyring.clone(), keyring.clone())?;
        Ok((ledger, keyring))
    }

    /// Builds a ledger on top of `store`, reloading whatever it holds.
    ///
    /// Fails if the stored blocks do not form a valid chain.
    pub fn from_store(
        store: Arc<dyn LedgerStore>,
        key_generator: Arc<dyn KeyGenerator>,
        signer: Arc<dyn Signer>,
    ) -> Result<Self, LedgerError> {
        let blocks = store.get_all_blocks()?;
        if !verify_blocks(&blocks) {
            return Err(LedgerError::InvalidChain(format!(
                "Stored chain of {} blocks failed verification",
                blocks.len()
            )));
        }

        let accounts = AccountRegistry::new();
        let stored_accounts = store.get_all_accounts()?;
        info!(
            "Loaded {} blocks and {} accounts from storage",
            blocks.len(),
            stored_accounts.len()
        );
        for account in stored_accounts {
            accounts.restore(account);
        }

        Ok(Ledger {
            chain: Arc::new(RwLock::new(ChainState::from_blocks(blocks))),
            pending_transactions: Arc::new(Mutex::new(Vec::new())),
            accounts,
            key_generator,
            signer,
            strategy: BalanceStrategy::default(),
            storage: Some(store),
        })
    }

    /// Selects how `balance_of` computes balances
    pub fn with_strategy(mut self, strategy: BalanceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> BalanceStrategy {
        self.strategy
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    /// Generates a fresh address and registers it for `currency` with a
    /// zero opening balance.
    ///
    /// If the registration cannot be stored, nothing is registered and the
    /// new key is dropped again.
    pub fn open_address(&self, currency: &str) -> Result<Address, LedgerError> {
        let address = self.key_generator.generate(currency)?;

        if let Some(storage) = &self.storage {
            if let Err(err) = storage.save_account(&Account::new(address.clone(), currency)) {
                self.key_generator.forget(&address);
                return Err(err.into());
            }
        }
        self.accounts.register(&address, currency);

        debug!("Opened {} address {}", currency, address);
        Ok(address)
    }

    pub fn is_registered(&self, address: &Address, currency: &str) -> bool {
        self.accounts.is_registered(address, currency)
    }

    /// Raises the opening balance of a registered `(address, currency)`
    pub fn fund(&self, address: &Address, currency: &str, amount: f64) -> Result<Account, LedgerError> {
        let storage = self.storage.clone();
        let account = self.accounts.update(address, currency, |account| {
            account.deposit(amount)?;
            if let Some(storage) = &storage {
                storage.save_account(account)?;
            }
            Ok::<(), LedgerError>(())
        })?;

        info!("Funded {} {} to {}", amount, currency, address);
        Ok(account)
    }

    /// Adds a new transaction to the pending pool.
    ///
    /// The transaction is signed if the signer holds the sender's key. No
    /// balance check happens here.
    pub fn submit(
        &self,
        from: &Address,
        to: &Address,
        currency: &str,
        amount: f64,
    ) -> Result<Transaction, LedgerError> {
        let mut transaction = Transaction::new(from.clone(), to.clone(), currency, amount)?;
        transaction.signature = self.signer.sign(&transaction);

        self.lock_pending().push(transaction.clone());

        debug!(
            "Queued transaction {}: {} {} from {} to {}",
            transaction.id, amount, currency, from, to
        );
        Ok(transaction)
    }

    /// Validates every pending transaction and commits them all as one block.
    ///
    /// A single invalid transaction rejects the whole batch and leaves both
    /// the pool and the chain untouched. An empty pool commits an empty block.
    pub fn mine(&self, miner: &Address, currency: &str) -> Result<BlockSummary, LedgerError> {
        let mut pending = self.lock_pending();

        for transaction in pending.iter() {
            self.authorize(transaction)?;
        }

        let mut chain = self.write_chain();
        let (index, previous_hash, last_timestamp) = match chain.blocks.last() {
            Some(last) => (last.index + 1, last.hash.clone(), last.timestamp),
            None => (0, GENESIS_PREVIOUS_HASH.to_string(), i64::MIN),
        };
        let timestamp = Utc::now().timestamp_millis().max(last_timestamp);

        let block = Block::new(
            index,
            timestamp,
            pending.clone(),
            miner.clone(),
            currency,
            previous_hash,
        )?;

        if let Some(storage) = &self.storage {
            storage.save_block(&block)?;
        }

        let summary = block.summary();
        chain.append_block(block);
        pending.clear();

        info!(
            "Mined block {} with {} transactions for {}",
            summary.index, summary.transaction_count, miner
        );
        Ok(summary)
    }

    /// Removes a transaction from the pending pool and returns it.
    ///
    /// This is how a caller clears a transaction that keeps a batch from
    /// being mined.
    pub fn discard_pending(&self, id: &str) -> Result<Transaction, LedgerError> {
        let mut pending = self.lock_pending();

        let position = pending
            .iter()
            .position(|transaction| transaction.id == id)
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))?;
        let transaction = pending.remove(position);

        info!("Discarded pending transaction {}", id);
        Ok(transaction)
    }

    fn authorize(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        if !self.accounts.is_registered(&transaction.from, &transaction.currency) {
            return Err(LedgerError::InvalidTransaction {
                id: transaction.id.clone(),
                reason: format!(
                    "sender {} is not registered for {}",
                    transaction.from, transaction.currency
                ),
            });
        }

        if !self.signer.is_authorized(transaction) {
            return Err(LedgerError::InvalidTransaction {
                id: transaction.id.clone(),
                reason: format!("sender {} did not authorize the transfer", transaction.from),
            });
        }

        Ok(())
    }

    /// Balance of `(address, currency)` using the configured strategy.
    ///
    /// Unknown pairs report 0. Balances may be negative.
    pub fn balance_of(&self, address: &Address, currency: &str) -> f64 {
        let chain = self.read_chain();
        self.balance_in(&chain, address, currency)
    }

    /// Balance computed by replaying every committed block
    pub fn replay_balance(&self, address: &Address, currency: &str) -> f64 {
        let chain = self.read_chain();
        replay_net(&chain.blocks, address, currency) + self.accounts.opening_balance(address, currency)
    }

    /// Balance read from the incremental index
    pub fn indexed_balance(&self, address: &Address, currency: &str) -> f64 {
        let chain = self.read_chain();
        chain.index.net(address, currency) + self.accounts.opening_balance(address, currency)
    }

    fn balance_in(&self, chain: &ChainState, address: &Address, currency: &str) -> f64 {
        let net = match self.strategy {
            BalanceStrategy::Replay => replay_net(&chain.blocks, address, currency),
            BalanceStrategy::Incremental => chain.index.net(address, currency),
        };
        net + self.accounts.opening_balance(address, currency)
    }

    /// Balances of every address registered for, or seen in history under,
    /// `currency`, ordered by address.
    pub fn balances(&self, currency: &str) -> Vec<AccountBalance> {
        let chain = self.read_chain();

        let mut addresses: BTreeSet<Address> = self
            .accounts
            .accounts_for(currency)
            .into_iter()
            .map(|account| account.address)
            .collect();
        addresses.extend(chain.index.addresses(currency).cloned());

        addresses
            .into_iter()
            .map(|address| AccountBalance {
                balance: self.balance_in(&chain, &address, currency),
                currency: currency.to_string(),
                address,
            })
            .collect()
    }

    /// All registrations with their opening balances, ordered by address
    /// then currency
    pub fn get_all_accounts(&self) -> Vec<Account> {
        let mut accounts = self.accounts.get_all_accounts();
        accounts.sort_by(|a, b| (&a.address, &a.currency).cmp(&(&b.address, &b.currency)));
        accounts
    }

    /// Gets the entire chain
    pub fn get_chain(&self) -> Vec<Block> {
        self.read_chain().blocks.clone()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.lock_pending().clone()
    }

    /// Chain and pool read under both locks, so a block and the clearing of
    /// its pool are never observed separately.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let pending = self.lock_pending();
        let chain = self.read_chain();
        LedgerSnapshot {
            blocks: chain.blocks.clone(),
            pending: pending.clone(),
        }
    }

    /// Number of committed blocks
    pub fn len(&self) -> usize {
        self.read_chain().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks hashes, linkage, indices and timestamps of the whole chain
    pub fn verify_chain(&self) -> bool {
        verify_blocks(&self.read_chain().blocks)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<Transaction>> {
        self.pending_transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_chain(&self) -> RwLockReadGuard<'_, ChainState> {
        self.chain.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_chain(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.chain.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Validates a sequence of blocks as a chain committed by [`Ledger::mine`]
pub fn verify_blocks(blocks: &[Block]) -> bool {
    let mut previous: Option<&Block> = None;

    for (position, block) in blocks.iter().enumerate() {
        if block.index != position as u64 {
            return false;
        }

        match block.calculate_hash() {
            Ok(hash) if hash == block.hash => {}
            _ => return false,
        }

        match previous {
            Some(previous) => {
                if block.previous_hash != previous.hash || block.timestamp < previous.timestamp {
                    return false;
                }
            }
            None => {
                if block.previous_hash != GENESIS_PREVIOUS_HASH {
                    return false;
                }
            }
        }

        previous = Some(block);
    }

    true
}
