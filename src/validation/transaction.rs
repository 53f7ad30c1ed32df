//! Transaction structure and validation
//!
//! UTXO-based transactions. A transaction id commits to its ordered input
//! txoids via a merkle root; signatures cover a canonical digest of
//! (inputs, outputs, id, txtype). Amounts are fixed-width 128-bit
//! integers; fractional values never survive the wire boundary.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{merkle_root, sha_base16, sha_bytes, verify_address_sig};

/// Smallest indivisible unit of value
pub type Amount = u128;

/// Version byte for the canonical list encoding
const CANON_VERSION: u8 = 0x01;

/// Transaction-level validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("Transaction id mismatch: expected {expected}, got {got}")]
    InvalidTxId { expected: String, got: String },
    #[error("Input {0} failed the pool check")]
    FailedPoolCheck(String),
    #[error("Input addresses are not covered by the signature set")]
    SigSetMismatch,
    #[error("Invalid signature for address {0}")]
    InvalidTxSig(String),
    #[error("UTXO amount is not a non-negative integer")]
    UtxoAmountNotInteger,
    #[error("Outputs exceed inputs: {outputs} > {inputs}")]
    OutputsExceedInputs { outputs: Amount, inputs: Amount },
    #[error("Malformed transaction: {0}")]
    Malformed(String),
}

/// An unspent transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Utxo {
    /// Globally unique "<tx_id>:<output_index>"
    pub txoid: String,
    /// Recipient address
    pub addr: String,
    /// Value in base units
    pub amount: Amount,
}

/// Transaction type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TxType {
    #[default]
    #[serde(rename = "P2PK")]
    P2pk,
    #[serde(rename = "COINBASE")]
    Coinbase,
}

impl TxType {
    /// Wire label, also part of the signing digest
    pub fn label(&self) -> &'static str {
        match self {
            TxType::P2pk => "P2PK",
            TxType::Coinbase => "COINBASE",
        }
    }
}

/// A complete transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    /// Merkle root over the ordered input txoids (coinbase: see
    /// [`Transaction::coinbase`])
    pub id: String,
    /// Ordered inputs; empty for a coinbase
    #[serde(default)]
    pub inputs: Vec<Utxo>,
    /// Ordered outputs
    pub outputs: Vec<Utxo>,
    /// One signature per distinct input address, keyed by address
    #[serde(default)]
    pub sigs: BTreeMap<String, String>,
    /// Transaction type
    #[serde(default)]
    pub txtype: TxType,
}

impl Transaction {
    /// Recompute the id commitment over the ordered input txoids
    pub fn calculate_hash(&self) -> Result<String, TxError> {
        let leaves: Vec<&[u8]> = self.inputs.iter().map(|i| i.txoid.as_bytes()).collect();
        merkle_root(&leaves)
            .map_err(|_| TxError::Malformed("transaction has no inputs".to_string()))
    }

    /// Create a coinbase paying `amount` to `miner_addr`
    ///
    /// The id is `sha_base16(miner_addr ‖ timestamp)` with the timestamp
    /// rendered as a decimal string, since there are no inputs to commit to.
    pub fn coinbase(amount: Amount, miner_addr: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();
        Self::coinbase_at(amount, miner_addr, &timestamp)
    }

    /// Coinbase with an explicit timestamp string (deterministic genesis)
    pub fn coinbase_at(amount: Amount, miner_addr: &str, timestamp: &str) -> Self {
        let id = sha_base16(format!("{}{}", miner_addr, timestamp));
        Self {
            inputs: vec![],
            outputs: vec![Utxo {
                txoid: format!("{}:0", id),
                addr: miner_addr.to_string(),
                amount,
            }],
            sigs: BTreeMap::new(),
            txtype: TxType::Coinbase,
            id,
        }
    }

    /// Check the type tag
    pub fn is_coinbase(&self) -> bool {
        self.txtype == TxType::Coinbase
    }

    /// Fee paid by this transaction (0 for a coinbase)
    pub fn fee(&self) -> Amount {
        let inputs = sum_amounts(&self.inputs).unwrap_or(Amount::MAX);
        let outputs = sum_amounts(&self.outputs).unwrap_or(Amount::MAX);
        inputs.saturating_sub(outputs)
    }

    /// Digest covered by every signature:
    /// SHA-256( canon(inputs) ‖ canon(outputs) ‖ id ‖ txtype )
    ///
    /// Depends only on (inputs, outputs, id, txtype) - reordering the
    /// signature set cannot change it.
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&canonical_utxos(&self.inputs));
        bytes.extend_from_slice(&canonical_utxos(&self.outputs));
        bytes.extend_from_slice(self.id.as_bytes());
        bytes.extend_from_slice(self.txtype.label().as_bytes());
        sha_bytes(&bytes)
    }

    /// Canonical byte serialization, the merkle leaf for block roots
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&canonical_utxos(&self.inputs));
        bytes.extend_from_slice(&canonical_utxos(&self.outputs));
        bytes.extend_from_slice(self.id.as_bytes());
        bytes.extend_from_slice(self.txtype.label().as_bytes());
        bytes.extend_from_slice(&(self.sigs.len() as u32).to_le_bytes());
        for (addr, sig) in &self.sigs {
            push_str(&mut bytes, addr);
            push_str(&mut bytes, sig);
        }
        bytes
    }
}

fn push_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Canonical encoding of a UTXO list (CANON v1)
pub fn canonical_utxos(utxos: &[Utxo]) -> Vec<u8> {
    let mut bytes = vec![CANON_VERSION];
    bytes.extend_from_slice(&(utxos.len() as u32).to_le_bytes());
    for utxo in utxos {
        push_str(&mut bytes, &utxo.txoid);
        push_str(&mut bytes, &utxo.addr);
        bytes.extend_from_slice(&utxo.amount.to_le_bytes());
    }
    bytes
}

/// Checked sum of UTXO amounts
pub fn sum_amounts(utxos: &[Utxo]) -> Option<Amount> {
    utxos
        .iter()
        .try_fold(0u128, |acc, u| acc.checked_add(u.amount))
}

/// Strictly deserialize a transaction from untrusted wire JSON
///
/// Replaces the dynamic field-stripping of looser runtimes: unknown keys
/// are rejected by the schema, and fractional or negative amounts are
/// rejected before they can round-trip through a float. Idempotent - a
/// sanitized transaction re-serializes to a value that sanitizes to
/// itself.
pub fn sanitize(value: &serde_json::Value) -> Result<Transaction, TxError> {
    check_amounts(value)?;
    serde_json::from_value(value.clone()).map_err(|e| TxError::Malformed(e.to_string()))
}

fn check_amounts(value: &serde_json::Value) -> Result<(), TxError> {
    for list_key in ["inputs", "outputs"] {
        if let Some(items) = value.get(list_key).and_then(|v| v.as_array()) {
            for item in items {
                if let Some(amount) = item.get("amount") {
                    let ok = matches!(
                        amount,
                        serde_json::Value::Number(n) if n.as_u128().is_some()
                    );
                    if !ok {
                        return Err(TxError::UtxoAmountNotInteger);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Validate a non-coinbase transaction
///
/// `pool_check` answers "is this input currently spendable?" and is
/// injected so the same validator can serve the main chain and forks.
pub fn validate_transaction(
    tx: &Transaction,
    pool_check: &dyn Fn(&Utxo) -> bool,
    address_version: u8,
) -> Result<(), TxError> {
    // 1. id commits to the ordered input txoids
    let expected = tx.calculate_hash()?;
    if tx.id != expected {
        return Err(TxError::InvalidTxId {
            expected,
            got: tx.id.clone(),
        });
    }

    // 2. every input must be spendable in the injected pool view
    for input in &tx.inputs {
        if !pool_check(input) {
            return Err(TxError::FailedPoolCheck(input.txoid.clone()));
        }
    }

    // 3. every input address must have a signature
    if !tx.inputs.iter().all(|i| tx.sigs.contains_key(&i.addr)) {
        return Err(TxError::SigSetMismatch);
    }

    // 4. every signature must verify against the signing digest
    let digest = tx.signing_digest();
    for (addr, sig) in &tx.sigs {
        if !verify_address_sig(addr, sig, &digest, address_version) {
            return Err(TxError::InvalidTxSig(addr.clone()));
        }
    }

    // 5. amounts are integers by construction (u128); the sums must not
    //    overflow the fixed width
    let inputs = sum_amounts(&tx.inputs).ok_or(TxError::UtxoAmountNotInteger)?;
    let outputs = sum_amounts(&tx.outputs).ok_or(TxError::UtxoAmountNotInteger)?;

    // 6. value cannot be created; the difference is the fee
    if outputs > inputs {
        return Err(TxError::OutputsExceedInputs { outputs, inputs });
    }

    Ok(())
}
