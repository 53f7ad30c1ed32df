//! Peer identity store
//!
//! Persists SRP material: records for peers that registered with us
//! (keyed by identifier), our own credentials per remote peer (keyed by
//! peer address), and the ordered known-peer address list.

use std::path::Path;

use sled::{Db, Tree};

use super::StoreError;
use crate::p2p::{OwnCredential, PeerRecord};

/// Sled-backed peer store
#[derive(Debug, Clone)]
pub struct PeerStore {
    db: Db,
    records: Tree,
    credentials: Tree,
    known_peers: Tree,
}

impl PeerStore {
    /// Open or create the store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let records = db.open_tree("peer_records")?;
        let credentials = db.open_tree("credentials")?;
        let known_peers = db.open_tree("known_peers")?;
        Ok(Self {
            db,
            records,
            credentials,
            known_peers,
        })
    }

    /// In-memory store for tests and ephemeral nodes
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let records = db.open_tree("peer_records")?;
        let credentials = db.open_tree("credentials")?;
        let known_peers = db.open_tree("known_peers")?;
        Ok(Self {
            db,
            records,
            credentials,
            known_peers,
        })
    }

    /// Persist a registered peer's SRP record
    pub fn put_record(&self, record: &PeerRecord) -> Result<(), StoreError> {
        let value = bincode::serialize(record).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.records.insert(record.identifier.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    /// Load a registered peer's SRP record
    pub fn get_record(&self, identifier: &str) -> Result<Option<PeerRecord>, StoreError> {
        match self.records.get(identifier.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    /// Persist our credential for a remote peer address
    pub fn put_credential(
        &self,
        peername: &str,
        credential: &OwnCredential,
    ) -> Result<(), StoreError> {
        let value =
            bincode::serialize(credential).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.credentials.insert(peername.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    /// Load our credential for a remote peer address
    pub fn get_credential(&self, peername: &str) -> Result<Option<OwnCredential>, StoreError> {
        match self.credentials.get(peername.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    /// Append an address to the known-peer list if not already present
    pub fn add_known_peer(&self, addr: &str) -> Result<(), StoreError> {
        let existing = self.known_peers()?;
        if existing.iter().any(|a| a == addr) {
            return Ok(());
        }
        let next = existing.len() as u64;
        self.known_peers
            .insert(next.to_be_bytes(), addr.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// The ordered known-peer address list
    pub fn known_peers(&self) -> Result<Vec<String>, StoreError> {
        let mut peers = Vec::new();
        for item in self.known_peers.iter() {
            let (_, value) = item?;
            peers.push(String::from_utf8_lossy(&value).into_owned());
        }
        Ok(peers)
    }
}
