use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use std::collections::BTreeSet;

use super::crypto::Address;
use super::transaction::{Transaction, TransactionError};

/// Hash linked before the first block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A committed batch of transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position of the block in commit order, starting at 0
    pub index: u64,

    /// Milliseconds since the Unix epoch, never lower than the previous block's
    pub timestamp: i64,

    /// Transactions in the order they were submitted
    pub transactions: Vec<Transaction>,

    /// Address that mined the block
    pub miner: Address,

    /// Currency label the miner declared for the batch
    pub currency: String,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Hash of the current block (calculated)
    pub hash: String,
}

impl Block {
    /// Creates a new block and computes its hash
    pub fn new(
        index: u64,
        timestamp: i64,
        transactions: Vec<Transaction>,
        miner: Address,
        currency: impl Into<String>,
        previous_hash: String,
    ) -> Result<Self, TransactionError> {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            miner,
            currency: currency.into(),
            previous_hash,
            hash: String::new(),
        };

        block.hash = block.calculate_hash()?;
        Ok(block)
    }

    /// SHA-256 over every field except the hash itself, hex encoded
    pub fn calculate_hash(&self) -> Result<String, TransactionError> {
        let block_data = serde_json::json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "miner": self.miner,
            "currency": self.currency,
            "previous_hash": self.previous_hash,
        });

        let block_bytes = serde_json::to_vec(&block_data)
            .map_err(|e| TransactionError::SerializationError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&block_bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Currencies actually moved by the block's transactions
    pub fn currencies(&self) -> BTreeSet<&str> {
        self.transactions
            .iter()
            .map(|transaction| transaction.currency.as_str())
            .collect()
    }

    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            index: self.index,
            hash: self.hash.clone(),
            miner: self.miner.clone(),
            currency: self.currency.clone(),
            timestamp: self.timestamp,
            transaction_count: self.transactions.len(),
            currencies: self.currencies().into_iter().map(str::to_string).collect(),
        }
    }
}

/// What `mine` reports back about a freshly committed block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BlockSummary {
    pub index: u64,
    pub hash: String,
    pub miner: Address,
    pub currency: String,
    pub timestamp: i64,
    pub transaction_count: usize,
    pub currencies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(from: &str, to: &str, currency: &str, amount: f64) -> Transaction {
        Transaction::new(Address::from(from), Address::from(to), currency, amount).unwrap()
    }

    #[test]
    fn test_new_block() {
        let transactions = vec![
            transfer("alice", "bob", "Bitcoin", 10.0),
            transfer("bob", "alice", "Ethereum", 5.0),
        ];

        let block = Block::new(
            0,
            1_700_000_000_000,
            transactions,
            Address::from("MinerAddress"),
            "Bitcoin",
            GENESIS_PREVIOUS_HASH.to_string(),
        )
        .unwrap();

        assert_eq!(block.index, 0);
        assert_eq!(block.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(block.hash.len(), 64);
        assert_eq!(block.hash, block.calculate_hash().unwrap());
    }

    #[test]
    fn test_hash_covers_transactions() {
        let mut block = Block::new(
            0,
            1,
            vec![transfer("alice", "bob", "Bitcoin", 10.0)],
            Address::from("MinerAddress"),
            "Bitcoin",
            GENESIS_PREVIOUS_HASH.to_string(),
        )
        .unwrap();

        block.transactions[0].amount = 1_000.0;
        assert_ne!(block.hash, block.calculate_hash().unwrap());
    }

    #[test]
    fn test_summary_derives_currencies() {
        let block = Block::new(
            3,
            1,
            vec![
                transfer("alice", "bob", "Ethereum", 1.0),
                transfer("alice", "bob", "Bitcoin", 2.0),
                transfer("bob", "alice", "Bitcoin", 1.0),
            ],
            Address::from("MinerAddress"),
            "Bitcoin",
            "abc".to_string(),
        )
        .unwrap();

        let summary = block.summary();
        assert_eq!(summary.index, 3);
        assert_eq!(summary.transaction_count, 3);
        assert_eq!(summary.currency, "Bitcoin");
        assert_eq!(summary.currencies, vec!["Bitcoin".to_string(), "Ethereum".to_string()]);
    }
}
