//! SHA-256 hashing
//!
//! All consensus-critical hashing in GHOST is SHA-256, hex-encoded.

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes and return the lowercase hex digest
pub fn sha_base16(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hex::encode(hasher.finalize())
}

/// Raw SHA-256 digest
pub fn sha_bytes(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Double hash (hash of hash), used for address checksums
pub fn double_sha_bytes(data: impl AsRef<[u8]>) -> [u8; 32] {
    sha_bytes(sha_bytes(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"hello world";
        assert_eq!(sha_base16(data), sha_base16(data));
    }

    #[test]
    fn test_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            sha_base16(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_different_inputs() {
        assert_ne!(sha_base16(b"hello"), sha_base16(b"world"));
    }

    #[test]
    fn test_hex_is_lowercase() {
        let digest = sha_base16(b"GHOST");
        assert_eq!(digest, digest.to_lowercase());
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_double_hash_differs_from_single() {
        assert_ne!(sha_bytes(b"x"), double_sha_bytes(b"x"));
    }
}
