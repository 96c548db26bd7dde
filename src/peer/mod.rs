// Peer module - KNOWN DEVICES
// Three-state peer table (offline / paging / online) keyed by radio address

mod registry;

pub use registry::{Peer, PeerRegistry, PeerState, PeerStats, RegistryError};
