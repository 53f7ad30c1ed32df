//! Storage module - peer identities, block ledger, UTXO pool, chainstate KV

mod chain;
mod kv;
mod peers;
mod utxo;

pub use chain::*;
pub use kv::*;
pub use peers::*;
pub use utxo::*;

use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database failure: {0}")]
    Db(#[from] sled::Error),
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}
