// PairingDb - Persistent pairing records using sled
//
// One record per paired device, keyed by its radio address:
//   pairing:<address-hex> -> postcard(PairingRecord)

use crate::wire::RadioAddress;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Key prefixes for organizing data
mod keys {
    pub const PAIRING_PREFIX: &[u8] = b"pairing:";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// A paired device
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRecord {
    pub address: RadioAddress,
    pub alias: String,
}

impl PairingRecord {
    pub fn new(address: RadioAddress, alias: &str) -> Self {
        Self {
            address,
            alias: alias.to_string(),
        }
    }
}

/// Where pairing records live
pub trait PairingStore {
    /// Visit every stored pairing
    fn for_each(&self, f: &mut dyn FnMut(&RadioAddress, &str)) -> Result<(), StoreError>;

    /// Persist a pairing, replacing any previous alias
    fn save(&self, address: &RadioAddress, alias: &str) -> Result<(), StoreError>;

    /// Forget a pairing; returns whether one existed
    fn remove(&self, address: &RadioAddress) -> Result<bool, StoreError>;

    /// Collect every stored pairing
    fn load_all(&self) -> Result<Vec<PairingRecord>, StoreError> {
        let mut records = Vec::new();
        self.for_each(&mut |address, alias| records.push(PairingRecord::new(*address, alias)))?;
        Ok(records)
    }
}

/// Pairing store backed by sled
///
/// Writes are flushed before returning so a pairing survives a crash right
/// after it was accepted.
pub struct PairingDb {
    db: sled::Db,
}

impl PairingDb {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Temporary store, removed on drop
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Number of stored pairings
    pub fn len(&self) -> usize {
        self.db.scan_prefix(keys::PAIRING_PREFIX).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alias stored for `address`
    pub fn get(&self, address: &RadioAddress) -> Result<Option<PairingRecord>, StoreError> {
        match self.db.get(Self::key(address))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    fn key(address: &RadioAddress) -> Vec<u8> {
        [keys::PAIRING_PREFIX, address.to_hex().as_bytes()].concat()
    }

    fn decode(bytes: &[u8]) -> Result<PairingRecord, StoreError> {
        postcard::from_bytes(bytes).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
    }
}

impl PairingStore for PairingDb {
    fn for_each(&self, f: &mut dyn FnMut(&RadioAddress, &str)) -> Result<(), StoreError> {
        for result in self.db.scan_prefix(keys::PAIRING_PREFIX) {
            let (_, value) = result?;
            let record = Self::decode(&value)?;
            f(&record.address, &record.alias);
        }
        Ok(())
    }

    fn save(&self, address: &RadioAddress, alias: &str) -> Result<(), StoreError> {
        let record = PairingRecord::new(*address, alias);
        let bytes = postcard::to_allocvec(&record)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
        self.db.insert(Self::key(address), bytes)?;
        self.flush()
    }

    fn remove(&self, address: &RadioAddress) -> Result<bool, StoreError> {
        let existed = self.db.remove(Self::key(address))?.is_some();
        self.flush()?;
        Ok(existed)
    }
}
