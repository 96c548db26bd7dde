// Storage module - PERSISTENCE
// Pairing records kept in sled

mod store;

pub use store::{PairingDb, PairingRecord, PairingStore, StoreError};
