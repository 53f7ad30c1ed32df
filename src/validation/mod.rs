//! Transaction validation module - UTXO model, sanitization, signing digest

mod transaction;

pub use transaction::*;
