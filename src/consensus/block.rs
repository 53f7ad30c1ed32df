//! Block structure for the GHOST blockchain
//!
//! A flat block record: hashes are lowercase hex strings, integers are
//! serialized big-endian into the header preimage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{merkle_root, sha_base16};
use crate::validation::{Transaction, TxError};

/// A complete block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    /// Height of this block
    pub index: u64,
    /// Hash of the block at `index - 1`
    pub previous_hash: String,
    /// Claimed block hash
    pub hash: String,
    /// Merkle root over the canonical transaction serializations
    pub merkle_root: String,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    /// Difficulty the block was mined at
    pub difficulty: u64,
    /// Proof-of-work nonce
    pub nonce: u64,
    /// Ordered transactions; element 0 is the unique coinbase
    pub transactions: Vec<Transaction>,
}

/// Errors from block (de)serialization
#[derive(Debug, Error)]
pub enum BlockCodecError {
    #[error("Malformed block: {0}")]
    Malformed(String),
    #[error(transparent)]
    Tx(#[from] TxError),
}

impl Block {
    /// Header preimage: index ‖ previous_hash ‖ merkle_root ‖ timestamp ‖
    /// difficulty ‖ nonce, with integers big-endian
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.index.to_be_bytes());
        bytes.extend_from_slice(self.previous_hash.as_bytes());
        bytes.extend_from_slice(self.merkle_root.as_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.difficulty.to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes
    }

    /// Recompute the block hash from the header fields
    pub fn compute_hash(&self) -> String {
        sha_base16(self.header_bytes())
    }

    /// Recompute the merkle root over the canonical transaction encodings
    pub fn compute_merkle_root(&self) -> Option<String> {
        let leaves: Vec<Vec<u8>> = self
            .transactions
            .iter()
            .map(|tx| tx.canonical_bytes())
            .collect();
        merkle_root(&leaves).ok()
    }

    /// Byte size of the wire (JSON) encoding, checked against the
    /// block-size limit
    pub fn encoded_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Check for the genesis block
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Strictly deserialize a block from untrusted wire JSON
    ///
    /// Unknown keys anywhere in the block or its transactions are
    /// rejected, and transaction amounts go through the same integer
    /// check as [`crate::validation::sanitize`].
    pub fn sanitize(value: &serde_json::Value) -> Result<Self, BlockCodecError> {
        if let Some(txs) = value.get("transactions").and_then(|v| v.as_array()) {
            for tx in txs {
                crate::validation::sanitize(tx)?;
            }
        }
        serde_json::from_value(value.clone())
            .map_err(|e| BlockCodecError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Transaction;

    fn block_with(transactions: Vec<Transaction>) -> Block {
        let mut block = Block {
            index: 1,
            previous_hash: "00".repeat(32),
            hash: String::new(),
            merkle_root: String::new(),
            timestamp: 1_700_000_000,
            difficulty: 0,
            nonce: 0,
            transactions,
        };
        block.merkle_root = block.compute_merkle_root().unwrap_or_default();
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn test_hash_deterministic() {
        let block = block_with(vec![Transaction::coinbase_at(50, "miner", "1700000000")]);
        assert_eq!(block.compute_hash(), block.compute_hash());
        assert_eq!(block.hash, block.compute_hash());
    }

    #[test]
    fn test_nonce_changes_hash() {
        let mut block = block_with(vec![Transaction::coinbase_at(50, "miner", "1700000000")]);
        let before = block.compute_hash();
        block.nonce += 1;
        assert_ne!(before, block.compute_hash());
    }

    #[test]
    fn test_merkle_root_tracks_transactions() {
        let a = block_with(vec![Transaction::coinbase_at(50, "miner", "1700000000")]);
        let b = block_with(vec![Transaction::coinbase_at(51, "miner", "1700000000")]);
        assert_ne!(a.merkle_root, b.merkle_root);
    }

    #[test]
    fn test_sanitize_roundtrip() {
        let block = block_with(vec![Transaction::coinbase_at(50, "miner", "1700000000")]);
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(Block::sanitize(&value).unwrap(), block);
    }

    #[test]
    fn test_sanitize_rejects_unknown_block_field() {
        let block = block_with(vec![Transaction::coinbase_at(50, "miner", "1700000000")]);
        let mut value = serde_json::to_value(&block).unwrap();
        value["extra"] = serde_json::json!(1);
        assert!(Block::sanitize(&value).is_err());
    }

    #[test]
    fn test_sanitize_rejects_fractional_tx_amount() {
        let block = block_with(vec![Transaction::coinbase_at(50, "miner", "1700000000")]);
        let mut value = serde_json::to_value(&block).unwrap();
        value["transactions"][0]["outputs"][0]["amount"] = serde_json::json!(0.5);
        assert!(Block::sanitize(&value).is_err());
    }

    #[test]
    fn test_encoded_size_positive() {
        let block = block_with(vec![Transaction::coinbase_at(50, "miner", "1700000000")]);
        assert!(block.encoded_size() > 100);
    }
}
