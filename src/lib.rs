//! Multi-currency wallet ledger.
//!
//! Balances are derived from an append-only chain of blocks plus per-currency
//! opening balances. Transactions wait in a pending pool until `mine`
//! validates the whole batch and commits it as one block.

pub mod api;
pub mod config;
pub mod ledger;
