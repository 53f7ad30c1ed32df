//! Block ledger
//!
//! Append-only store of accepted blocks keyed by big-endian index, with
//! tip metadata and the timestamp window the difficulty retarget reads.

use std::path::Path;

use sled::{Db, Tree};

use super::StoreError;
use crate::consensus::Block;

const TIP_INDEX_KEY: &str = "tip_index";

/// Sled-backed append-only block store
#[derive(Debug, Clone)]
pub struct ChainStore {
    db: Db,
    blocks: Tree,
    metadata: Tree,
}

impl ChainStore {
    /// Open or create the store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::with_db(db)
    }

    /// In-memory store for tests and ephemeral nodes
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db)
    }

    fn with_db(db: Db) -> Result<Self, StoreError> {
        let blocks = db.open_tree("blocks")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            blocks,
            metadata,
        })
    }

    /// Append an accepted block
    pub fn append(&self, block: &Block) -> Result<(), StoreError> {
        let value = bincode::serialize(block).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.blocks.insert(block.index.to_be_bytes(), value)?;
        self.metadata
            .insert(TIP_INDEX_KEY, block.index.to_be_bytes().as_ref())?;
        self.db.flush()?;
        Ok(())
    }

    /// Look up a block by index
    pub fn block_by_index(&self, index: u64) -> Result<Option<Block>, StoreError> {
        match self.blocks.get(index.to_be_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    /// The current tip, if any block has been accepted
    pub fn last_block(&self) -> Result<Option<Block>, StoreError> {
        let tip = match self.metadata.get(TIP_INDEX_KEY)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                u64::from_be_bytes(buf)
            }
            _ => return Ok(None),
        };
        self.block_by_index(tip)
    }

    /// Timestamps of the last `window` blocks ending at the tip,
    /// oldest-first; for the retargeting calculation
    pub fn window_timestamps(&self, window: u64) -> Result<Vec<u64>, StoreError> {
        let tip = match self.last_block()? {
            Some(b) => b.index,
            None => return Ok(vec![]),
        };
        let start = tip.saturating_sub(window.saturating_sub(1));
        let mut stamps = Vec::new();
        for index in start..=tip {
            if let Some(block) = self.block_by_index(index)? {
                stamps.push(block.timestamp);
            }
        }
        Ok(stamps)
    }
}
