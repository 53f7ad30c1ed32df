//! Block reward calculation
//!
//! Linear-decay emission over a triangular sigma. With
//! `B = block_at_full_emission` and `T(B) = B(B+1)/2`, block `i` pays
//! `total_token_supply * (B - i) / T(B)` for `i < B` and nothing after.
//! Summed over all paying blocks the schedule issues the full supply
//! minus at most `B` base units of integer-division dust.

use super::ChainParams;
use crate::validation::Amount;

/// Reward paid by the coinbase of block `index`
///
/// Pure and deterministic; two nodes with the same parameters always
/// agree.
pub fn block_reward(index: u64, params: &ChainParams) -> Amount {
    let full = params.block_at_full_emission;
    if index >= full {
        return 0;
    }
    let sigma = triangular(full);
    if sigma == 0 {
        return 0;
    }
    let remaining_weight = (full - index) as u128;
    params.total_token_supply / sigma * remaining_weight
        + params.total_token_supply % sigma * remaining_weight / sigma
}

/// T(n) = n(n+1)/2
fn triangular(n: u64) -> u128 {
    let n = n as u128;
    n * (n + 1) / 2
}

/// Simulate the schedule and return the total issued after `num_blocks`
///
/// Verification helper for supply-invariant tests.
pub fn total_issued(num_blocks: u64, params: &ChainParams) -> Amount {
    (0..num_blocks)
        .map(|i| block_reward(i, params))
        .fold(0u128, |acc, r| acc.saturating_add(r))
}
