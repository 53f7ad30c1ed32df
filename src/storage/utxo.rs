//! UTXO pool
//!
//! In-memory map of spendable outputs keyed by txoid. `is_spendable` is
//! the oracle behind the validator's injected pool check.

use std::collections::HashMap;

use crate::consensus::Block;
use crate::validation::{Amount, Transaction, Utxo};

/// Set of all unspent transaction outputs
#[derive(Debug, Default)]
pub struct UtxoStore {
    utxos: HashMap<String, Utxo>,
}

impl UtxoStore {
    pub fn new() -> Self {
        Self {
            utxos: HashMap::new(),
        }
    }

    /// Is this exact UTXO currently spendable?
    ///
    /// The reference must match the stored output in address and amount,
    /// not just exist under the txoid.
    pub fn is_spendable(&self, reference: &Utxo) -> bool {
        self.utxos
            .get(&reference.txoid)
            .map(|stored| stored == reference)
            .unwrap_or(false)
    }

    pub fn get(&self, txoid: &str) -> Option<&Utxo> {
        self.utxos.get(txoid)
    }

    pub fn insert(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.txoid.clone(), utxo);
    }

    pub fn remove(&mut self, txoid: &str) -> Option<Utxo> {
        self.utxos.remove(txoid)
    }

    /// Consume a transaction's inputs and create its outputs
    pub fn apply_transaction(&mut self, tx: &Transaction) {
        for input in &tx.inputs {
            self.remove(&input.txoid);
        }
        for output in &tx.outputs {
            self.insert(output.clone());
        }
    }

    /// Apply every transaction of an accepted block
    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.apply_transaction(tx);
        }
    }

    /// Total value held by an address
    pub fn balance(&self, addr: &str) -> Amount {
        self.utxos
            .values()
            .filter(|u| u.addr == addr)
            .fold(0u128, |acc, u| acc.saturating_add(u.amount))
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}
