//! Merkle tree implementation
//!
//! Commits to an ordered list of byte leaves. Used for transaction ids
//! (over input txoids) and block merkle roots (over serialized
//! transactions).

use thiserror::Error;

use super::sha_base16;

/// Merkle computation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Cannot compute a merkle root over an empty leaf list")]
    EmptyLeaves,
}

/// Compute the merkle root of an ordered list of byte leaves
///
/// Each leaf is first hashed to hex. Pairs are combined left-to-right by
/// concatenating the two hex strings and re-hashing. An odd level
/// duplicates its last element. Empty input is rejected.
pub fn merkle_root<T: AsRef<[u8]>>(leaves: &[T]) -> Result<String, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyLeaves);
    }

    let mut current_level: Vec<String> = leaves.iter().map(sha_base16).collect();

    while current_level.len() > 1 {
        // If odd number, duplicate last
        if current_level.len() % 2 == 1 {
            let last = current_level
                .last()
                .cloned()
                .unwrap_or_default();
            current_level.push(last);
        }

        let mut next_level = Vec::with_capacity(current_level.len() / 2);
        for chunk in current_level.chunks(2) {
            let mut combined = String::with_capacity(chunk[0].len() + chunk[1].len());
            combined.push_str(&chunk[0]);
            combined.push_str(&chunk[1]);
            next_level.push(sha_base16(combined));
        }

        current_level = next_level;
    }

    Ok(current_level.remove(0))
}
