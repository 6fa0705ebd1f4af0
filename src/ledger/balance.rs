use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::block::Block;
use super::crypto::Address;

/// How `balance_of` derives a balance from committed history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceStrategy {
    /// Scan every committed transaction on each query
    Replay,

    /// Keep a running net per `(address, currency)`, updated once per block
    #[default]
    Incremental,
}

impl FromStr for BalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" => Ok(BalanceStrategy::Replay),
            "incremental" => Ok(BalanceStrategy::Incremental),
            other => Err(format!("unknown balance strategy '{}'", other)),
        }
    }
}

impl fmt::Display for BalanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceStrategy::Replay => write!(f, "replay"),
            BalanceStrategy::Incremental => write!(f, "incremental"),
        }
    }
}

/// Net effect of all committed transactions on `(address, currency)`,
/// blocks in commit order and transactions in stored order.
pub fn replay_net(blocks: &[Block], address: &Address, currency: &str) -> f64 {
    blocks
        .iter()
        .flat_map(|block| block.transactions.iter())
        .fold(0.0, |balance, transaction| {
            transaction.apply_to(balance, address, currency)
        })
}

/// Running net per `(address, currency)`.
///
/// Applies transactions with the same arithmetic and in the same order as
/// [`replay_net`], so both produce identical values.
#[derive(Debug, Clone, Default)]
pub struct BalanceIndex {
    nets: HashMap<(Address, String), f64>,
}

impl BalanceIndex {
    pub fn new() -> Self {
        BalanceIndex {
            nets: HashMap::new(),
        }
    }

    /// Builds an index from scratch by replaying `blocks`
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let mut index = BalanceIndex::new();
        for block in blocks {
            index.apply_block(block);
        }
        index
    }

    pub fn apply_block(&mut self, block: &Block) {
        for transaction in &block.transactions {
            let debit = self
                .nets
                .entry((transaction.from.clone(), transaction.currency.clone()))
                .or_insert(0.0);
            *debit -= transaction.amount;

            let credit = self
                .nets
                .entry((transaction.to.clone(), transaction.currency.clone()))
                .or_insert(0.0);
            *credit += transaction.amount;
        }
    }

    pub fn net(&self, address: &Address, currency: &str) -> f64 {
        self.nets
            .get(&(address.clone(), currency.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Addresses that appear in history under `currency`
    pub fn addresses(&self, currency: &str) -> impl Iterator<Item = &Address> + '_ {
        let currency = currency.to_string();
        self.nets
            .keys()
            .filter(move |(_, c)| *c == currency)
            .map(|(address, _)| address)
    }
}
