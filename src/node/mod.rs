//! Node module - chain bootstrap and block ingress
//!
//! The router-side consumer of the p2p fleet: blocks arrive as Ghost
//! messages, get sanitized and validated, and are applied to the ledger
//! and UTXO pool.

mod genesis;

pub use genesis::*;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

use crate::consensus::{
    next_difficulty, should_retarget, validate_block, Block, BlockCodecError, BlockError,
    ChainParams,
};
use crate::p2p::GhostMessage;
use crate::storage::{ChainStore, StoreError, UtxoStore};
use crate::validation::Utxo;

/// Errors from block ingress
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Codec(#[from] BlockCodecError),
    #[error(transparent)]
    Consensus(#[from] BlockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Chain has no blocks yet and the candidate is not genesis")]
    NotInitialized,
}

/// The chain-owning side of the node
pub struct Node {
    pub params: ChainParams,
    pub chain: ChainStore,
    pub utxos: UtxoStore,
}

impl Node {
    /// Open the node over a chain store, creating and applying the
    /// genesis block on first start
    pub fn bootstrap(params: ChainParams, chain: ChainStore) -> Result<Self, NodeError> {
        let mut node = Self {
            params,
            chain,
            utxos: UtxoStore::new(),
        };
        match node.chain.last_block()? {
            Some(tip) => {
                // Rebuild the UTXO pool from the stored chain
                for index in 0..=tip.index {
                    if let Some(block) = node.chain.block_by_index(index)? {
                        node.utxos.apply_block(&block);
                    }
                }
            }
            None => {
                let genesis = create_genesis_block(&node.params);
                node.chain.append(&genesis)?;
                node.utxos.apply_block(&genesis);
            }
        }
        Ok(node)
    }

    /// The difficulty the next block must satisfy
    pub fn expected_difficulty(&self) -> Result<u64, StoreError> {
        let tip = match self.chain.last_block()? {
            Some(b) => b,
            None => return Ok(0),
        };
        let next_index = tip.index + 1;
        if should_retarget(next_index, &self.params) {
            let window = self
                .chain
                .window_timestamps(self.params.retargeting_window)?;
            Ok(next_difficulty(tip.difficulty, &window, &self.params))
        } else {
            Ok(tip.difficulty)
        }
    }

    /// Sanitize, validate, and apply a candidate block from the wire
    pub fn submit_block(
        &mut self,
        value: &serde_json::Value,
        now: u64,
    ) -> Result<Block, NodeError> {
        let block = Block::sanitize(value)?;
        let tip = match self.chain.last_block()? {
            Some(b) => b,
            None if block.is_genesis() => block.clone(),
            None => return Err(NodeError::NotInitialized),
        };
        let difficulty = self.expected_difficulty()?;

        let utxos = &self.utxos;
        let pool_check = |input: &Utxo| utxos.is_spendable(input);
        validate_block(&block, difficulty, &tip, &pool_check, &self.params, now)?;

        self.chain.append(&block)?;
        self.utxos.apply_block(&block);
        Ok(block)
    }

    /// Current tip, present after bootstrap
    pub fn tip(&self) -> Result<Option<Block>, StoreError> {
        self.chain.last_block()
    }
}

/// Wrap a block for gossip: JSON, base64, one string param
pub fn block_to_message(block: &Block) -> Option<GhostMessage> {
    let json = serde_json::to_vec(block).ok()?;
    Some(GhostMessage::new("BLOCK").with_str("DATA", BASE64.encode(json)))
}

/// Unwrap a gossiped block back to its wire JSON
pub fn message_block_json(message: &GhostMessage) -> Option<serde_json::Value> {
    let data = message.get_str("DATA")?;
    let bytes = BASE64.decode(data).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::block_reward;
    use crate::validation::Transaction;

    fn test_node() -> Node {
        let chain = ChainStore::temporary().unwrap();
        Node::bootstrap(ChainParams::default(), chain).unwrap()
    }

    /// A valid follow-up block over the current tip
    fn next_block(node: &Node, timestamp: u64) -> Block {
        let tip = node.tip().unwrap().unwrap();
        let reward = block_reward(tip.index + 1, &node.params);
        let mut block = Block {
            index: tip.index + 1,
            previous_hash: tip.hash.clone(),
            hash: String::new(),
            merkle_root: String::new(),
            timestamp,
            difficulty: node.expected_difficulty().unwrap(),
            nonce: 0,
            transactions: vec![Transaction::coinbase_at(
                reward,
                "miner",
                &timestamp.to_string(),
            )],
        };
        block.merkle_root = block.compute_merkle_root().unwrap();
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn test_bootstrap_applies_genesis() {
        let node = test_node();
        let tip = node.tip().unwrap().unwrap();
        assert_eq!(tip.index, 0);
        assert!(!node.utxos.is_empty());
    }

    #[test]
    fn test_submit_extends_chain() {
        let mut node = test_node();
        let block = next_block(&node, crate::constants::GENESIS_TIMESTAMP + 120);
        let value = serde_json::to_value(&block).unwrap();
        let accepted = node
            .submit_block(&value, crate::constants::GENESIS_TIMESTAMP + 200)
            .unwrap();
        assert_eq!(accepted.index, 1);
        assert_eq!(node.tip().unwrap().unwrap().index, 1);
        // The coinbase output is now spendable
        assert!(node.utxos.balance("miner") > 0);
    }

    #[test]
    fn test_submit_rejects_bad_coinbase() {
        let mut node = test_node();
        let mut block = next_block(&node, crate::constants::GENESIS_TIMESTAMP + 120);
        block.transactions[0].outputs[0].amount += 1;
        block.merkle_root = block.compute_merkle_root().unwrap();
        block.hash = block.compute_hash();
        let value = serde_json::to_value(&block).unwrap();
        let result = node.submit_block(&value, crate::constants::GENESIS_TIMESTAMP + 200);
        assert!(matches!(
            result,
            Err(NodeError::Consensus(BlockError::InvalidCoinbase { .. }))
        ));
    }

    #[test]
    fn test_block_message_roundtrip() {
        let node = test_node();
        let tip = node.tip().unwrap().unwrap();
        let message = block_to_message(&tip).unwrap();
        let json = message_block_json(&message).unwrap();
        assert_eq!(Block::sanitize(&json).unwrap(), tip);
    }

    #[test]
    fn test_bootstrap_restores_utxos() {
        let chain = ChainStore::temporary().unwrap();
        let mut node = Node::bootstrap(ChainParams::default(), chain).unwrap();
        let block = next_block(&node, crate::constants::GENESIS_TIMESTAMP + 120);
        let value = serde_json::to_value(&block).unwrap();
        node.submit_block(&value, crate::constants::GENESIS_TIMESTAMP + 200)
            .unwrap();

        // Re-open over the same (shared) sled handle
        let reopened = Node::bootstrap(ChainParams::default(), node.chain.clone()).unwrap();
        assert_eq!(reopened.tip().unwrap().unwrap().index, 1);
        assert_eq!(reopened.utxos.balance("miner"), node.utxos.balance("miner"));
    }
}
