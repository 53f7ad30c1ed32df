//! Difficulty target test and retargeting
//!
//! The target for difficulty `d` is `2^(256 - d)`: a hash beats the
//! target exactly when, read as a big-endian 256-bit integer, it is
//! strictly below it - equivalently, when it carries at least `d`
//! leading zero bits. Difficulty 0 accepts every hash.

use super::ChainParams;

/// Minimum difficulty after retargeting
pub const MIN_DIFFICULTY: u64 = 1;

/// Does `hash_hex` beat the target derived from `difficulty`?
pub fn hash_beats_target(hash_hex: &str, difficulty: u64) -> bool {
    if difficulty == 0 {
        return true;
    }
    if difficulty > 256 {
        return false;
    }
    let bytes = match hex::decode(hash_hex) {
        Ok(b) if b.len() == 32 => b,
        _ => return false,
    };
    leading_zero_bits(&bytes) >= difficulty
}

fn leading_zero_bits(bytes: &[u8]) -> u64 {
    let mut zeros = 0u64;
    for &byte in bytes {
        if byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros() as u64;
            break;
        }
    }
    zeros
}

/// Should the difficulty be recomputed at this height?
pub fn should_retarget(index: u64, params: &ChainParams) -> bool {
    index > 0 && index % params.retargeting_window == 0
}

/// Compute the next difficulty from the timestamps of the last window
///
/// `window_timestamps` is ordered oldest-first. The average solvetime over
/// the window is compared against the target with a percent deadband
/// (`diff_rebalance_offset`); outside it, the difficulty steps by one bit
/// in the correcting direction. Integer math only.
pub fn next_difficulty(current: u64, window_timestamps: &[u64], params: &ChainParams) -> u64 {
    if window_timestamps.len() < 2 {
        return current;
    }
    let first = window_timestamps[0];
    let last = window_timestamps[window_timestamps.len() - 1];
    let spans = (window_timestamps.len() - 1) as u64;
    let avg = last.saturating_sub(first) / spans;

    let target = params.target_solvetime;
    let offset = params.diff_rebalance_offset.min(100);

    if avg * 100 < target * (100 - offset) {
        // Blocks are coming too fast
        (current + 1).min(256)
    } else if avg * 100 > target * (100 + offset) {
        // Blocks are coming too slow
        current.saturating_sub(1).max(MIN_DIFFICULTY)
    } else {
        current
    }
}
