//! Schnorr keypairs and addresses
//!
//! secp256k1 Schnorr (BIP340) signatures. Addresses embed the 32-byte
//! x-only public key behind a version byte and checksum, so the key is
//! always recoverable from the address - transaction validation derives
//! the verifying key from input addresses alone.

use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::double_sha_bytes;

/// Signature and address errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid signature encoding")]
    InvalidSignature,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// A signing keypair with its derived address
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    /// Address derived from the public key
    pub address: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair({}, [REDACTED])", self.address)
    }
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate(address_version: u8) -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let address = address_from_pubkey(&pubkey_bytes(&signing_key), address_version);
        Self {
            signing_key,
            address,
        }
    }

    /// Import from 32 private-key bytes
    pub fn from_bytes(bytes: &[u8; 32], address_version: u8) -> Result<Self, KeyError> {
        let signing_key =
            SigningKey::from_bytes(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        let address = address_from_pubkey(&pubkey_bytes(&signing_key), address_version);
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Sign a 32-byte digest, returning the hex-encoded 64-byte signature
    pub fn sign(&self, digest: &[u8; 32]) -> String {
        let signature: Signature = self.signing_key.sign(digest);
        hex::encode(signature.to_bytes())
    }
}

fn pubkey_bytes(signing_key: &SigningKey) -> [u8; 32] {
    signing_key.verifying_key().to_bytes().into()
}

/// Encode a 32-byte x-only public key as an address:
/// base58( version ‖ pubkey ‖ checksum4 )
pub fn address_from_pubkey(pubkey: &[u8; 32], version: u8) -> String {
    let mut payload = Vec::with_capacity(37);
    payload.push(version);
    payload.extend_from_slice(pubkey);
    let checksum = double_sha_bytes(&payload);
    payload.extend_from_slice(&checksum[0..4]);
    bs58::encode(payload).into_string()
}

/// Recover the 32-byte public key embedded in an address
pub fn pubkey_from_address(address: &str, version: u8) -> Result<[u8; 32], KeyError> {
    let payload = bs58::decode(address)
        .into_vec()
        .map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
    if payload.len() != 37 {
        return Err(KeyError::InvalidAddress(format!(
            "wrong payload length {}",
            payload.len()
        )));
    }
    if payload[0] != version {
        return Err(KeyError::InvalidAddress(format!(
            "wrong version byte 0x{:02x}",
            payload[0]
        )));
    }
    let checksum = double_sha_bytes(&payload[0..33]);
    if payload[33..37] != checksum[0..4] {
        return Err(KeyError::InvalidAddress("bad checksum".to_string()));
    }
    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&payload[1..33]);
    Ok(pubkey)
}

/// Verify a hex signature over a digest against the key embedded in `address`
///
/// Any decoding failure counts as an invalid signature.
pub fn verify_address_sig(
    address: &str,
    sig_hex: &str,
    digest: &[u8; 32],
    version: u8,
) -> bool {
    let pubkey = match pubkey_from_address(address, version) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let verifying_key = match VerifyingKey::from_bytes(&pubkey) {
        Ok(vk) => vk,
        Err(_) => return false,
    };
    let sig_bytes = match hex::decode(sig_hex) {
        Ok(b) => b,
        Err(_) => return false,
    };
    let signature = match Signature::try_from(sig_bytes.as_slice()) {
        Ok(s) => s,
        Err(_) => return false,
    };
    verifying_key.verify(digest, &signature).is_ok()
}
