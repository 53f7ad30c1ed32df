//! Genesis block generation
//!
//! Produces the reproducible block 0: a fixed timestamp, difficulty 0
//! (every hash beats an unset target), and a coinbase paying the full
//! height-zero reward to the genesis address.

use crate::consensus::{block_reward, Block, ChainParams};
use crate::constants::{GENESIS_ADDRESS, GENESIS_TIMESTAMP};
use crate::validation::Transaction;

/// Create the genesis block for the given parameters
///
/// Byte-for-byte reproducible: same parameters, same block.
pub fn create_genesis_block(params: &ChainParams) -> Block {
    let reward = block_reward(0, params);
    let coinbase =
        Transaction::coinbase_at(reward, GENESIS_ADDRESS, &GENESIS_TIMESTAMP.to_string());

    let mut block = Block {
        index: 0,
        previous_hash: "0".repeat(64),
        hash: String::new(),
        merkle_root: String::new(),
        timestamp: GENESIS_TIMESTAMP,
        difficulty: 0,
        nonce: 0,
        transactions: vec![coinbase],
    };
    block.merkle_root = block.compute_merkle_root().unwrap_or_default();
    block.hash = block.compute_hash();
    block
}

/// Hash of the genesis block under the given parameters
pub fn genesis_hash(params: &ChainParams) -> String {
    create_genesis_block(params).hash
}
