//! Block validation
//!
//! The pure consensus gate. Every rule here is bit-exact consensus: two
//! implementations that disagree on any branch fork the chain. No I/O -
//! the UTXO view arrives as an injected predicate and the clock as an
//! argument.

use thiserror::Error;

use super::{block_reward, hash_beats_target, Block, ChainParams};
use crate::validation::{
    sum_amounts, validate_transaction, Amount, TxError, TxType, Utxo,
};

/// Block-level validation errors, first failure wins
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("Invalid index: previous is {prev}, got {got}")]
    InvalidIndex { prev: u64, got: u64 },
    #[error("Previous hash {got} does not match last block hash {expected}")]
    DoesntMatchLast { got: String, expected: String },
    #[error("Computed hash {computed} does not match provided hash {claimed}")]
    DoesntMatchProvided { computed: String, claimed: String },
    #[error("Hash {hash} does not beat difficulty {difficulty}")]
    TooHigh { hash: String, difficulty: u64 },
    #[error("Merkle root does not match the block transactions")]
    InvalidMerkleRoot,
    #[error("Block timestamp is too far in the future")]
    TimestampTooHigh,
    #[error("Encoded block exceeds the size limit")]
    BlockTooLarge,
    #[error("Block has no coinbase")]
    NoCoinbase,
    #[error("First transaction is {actual}, not a coinbase")]
    NotCoinbase { actual: String },
    #[error("Block has more than one coinbase")]
    TooManyCoinbase,
    #[error("Coinbase pays {amount}, expected reward {reward} plus fees {fees}")]
    InvalidCoinbase {
        fees: Amount,
        reward: Amount,
        amount: Amount,
    },
    #[error("Invalid transactions in block")]
    InvalidTransactions(Vec<(String, TxError)>),
}

/// Validate a candidate block against the chain tip
///
/// `pool_check` answers "is this input spendable?" against whichever UTXO
/// view the caller wants (main chain or fork). `now` is injected so the
/// future-timestamp rule is deterministic under test. Genesis blocks
/// (`index == 0`) skip the index and previous-hash checks.
pub fn validate_block(
    block: &Block,
    difficulty: u64,
    last_block: &Block,
    pool_check: &dyn Fn(&Utxo) -> bool,
    params: &ChainParams,
    now: u64,
) -> Result<(), BlockError> {
    if !block.is_genesis() {
        if block.index <= last_block.index {
            return Err(BlockError::InvalidIndex {
                prev: last_block.index,
                got: block.index,
            });
        }
        if block.previous_hash != last_block.hash {
            return Err(BlockError::DoesntMatchLast {
                got: block.previous_hash.clone(),
                expected: last_block.hash.clone(),
            });
        }
    }

    check_coinbase(block, params)?;
    check_transactions(block, pool_check, params)?;

    match block.compute_merkle_root() {
        Some(root) if root == block.merkle_root => {}
        _ => return Err(BlockError::InvalidMerkleRoot),
    }

    let computed = block.compute_hash();
    if computed != block.hash {
        return Err(BlockError::DoesntMatchProvided {
            computed,
            claimed: block.hash.clone(),
        });
    }
    if !hash_beats_target(&block.hash, difficulty) {
        return Err(BlockError::TooHigh {
            hash: block.hash.clone(),
            difficulty,
        });
    }

    if block.timestamp >= now + params.future_time_limit {
        return Err(BlockError::TimestampTooHigh);
    }

    if block.encoded_size() > params.block_size_limit {
        return Err(BlockError::BlockTooLarge);
    }

    Ok(())
}

/// Coinbase well-formedness: exactly one coinbase, first, paying
/// reward-plus-fees in a single output with no inputs
fn check_coinbase(block: &Block, params: &ChainParams) -> Result<(), BlockError> {
    let coinbase = block.transactions.first().ok_or(BlockError::NoCoinbase)?;
    if coinbase.txtype != TxType::Coinbase {
        return Err(BlockError::NotCoinbase {
            actual: coinbase.txtype.label().to_string(),
        });
    }
    let coinbase_count = block
        .transactions
        .iter()
        .filter(|tx| tx.txtype == TxType::Coinbase)
        .count();
    if coinbase_count > 1 {
        return Err(BlockError::TooManyCoinbase);
    }

    let reward = block_reward(block.index, params);
    let fees = block
        .transactions
        .iter()
        .skip(1)
        .fold(0u128, |acc, tx| acc.saturating_add(tx.fee()));
    let expected = reward.saturating_add(fees);

    let amount = match (&coinbase.inputs[..], &coinbase.outputs[..]) {
        ([], [only]) => only.amount,
        // Wrong shape: report whatever it actually pays
        _ => sum_amounts(&coinbase.outputs).unwrap_or(Amount::MAX),
    };
    let well_formed = coinbase.inputs.is_empty() && coinbase.outputs.len() == 1;

    if !well_formed || amount != expected {
        return Err(BlockError::InvalidCoinbase {
            fees,
            reward: expected,
            amount,
        });
    }
    Ok(())
}

/// Validate every non-coinbase transaction, aggregating failures
fn check_transactions(
    block: &Block,
    pool_check: &dyn Fn(&Utxo) -> bool,
    params: &ChainParams,
) -> Result<(), BlockError> {
    let mut failures = Vec::new();
    for tx in block.transactions.iter().skip(1) {
        if let Err(e) = validate_transaction(tx, pool_check, params.address_version) {
            failures.push((tx.id.clone(), e));
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(BlockError::InvalidTransactions(failures))
    }
}
