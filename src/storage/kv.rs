//! Chainstate key-value store
//!
//! Opaque binary values grouped under a key. `update` merges a map into
//! whatever is already stored; `get` returns the current merged value.

use std::collections::BTreeMap;
use std::path::Path;

use sled::{Db, Tree};

use super::StoreError;

/// A stored value: named binary fields
pub type KvValue = BTreeMap<String, Vec<u8>>;

/// Sled-backed merge-on-update KV store
#[derive(Debug, Clone)]
pub struct ChainKv {
    db: Db,
    tree: Tree,
}

impl ChainKv {
    /// Open or create the store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("chainstate")?;
        Ok(Self { db, tree })
    }

    /// In-memory store for tests and ephemeral nodes
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree("chainstate")?;
        Ok(Self { db, tree })
    }

    /// Merge `fields` into the value stored under `key`
    ///
    /// Existing fields not named in `fields` survive; named fields are
    /// overwritten.
    pub fn update(&self, key: &str, fields: KvValue) -> Result<(), StoreError> {
        let mut current = self.get(key)?.unwrap_or_default();
        current.extend(fields);
        let value = bincode::serialize(&current).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.tree.insert(key.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    /// The current value under `key`
    pub fn get(&self, key: &str) -> Result<Option<KvValue>, StoreError> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &[u8])]) -> KvValue {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    #[test]
    fn test_get_missing() {
        let kv = ChainKv::temporary().unwrap();
        assert_eq!(kv.get("nothing").unwrap(), None);
    }

    #[test]
    fn test_update_merges() {
        let kv = ChainKv::temporary().unwrap();
        kv.update("state", fields(&[("a", b"1"), ("b", b"2")])).unwrap();
        kv.update("state", fields(&[("b", b"3"), ("c", b"4")])).unwrap();

        let value = kv.get("state").unwrap().unwrap();
        assert_eq!(value.get("a").unwrap(), b"1");
        assert_eq!(value.get("b").unwrap(), b"3");
        assert_eq!(value.get("c").unwrap(), b"4");
    }

    #[test]
    fn test_keys_are_independent() {
        let kv = ChainKv::temporary().unwrap();
        kv.update("one", fields(&[("a", b"1")])).unwrap();
        kv.update("two", fields(&[("a", b"2")])).unwrap();
        assert_eq!(kv.get("one").unwrap().unwrap().get("a").unwrap(), b"1");
        assert_eq!(kv.get("two").unwrap().unwrap().get("a").unwrap(), b"2");
    }
}
