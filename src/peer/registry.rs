// Peer Registry - Track known devices and their connection state
//
// Every address lives in exactly one of the Offline, Paging or Online
// partitions. All transitions go through the methods below, which also keep the
// per-state counters the admission controller relies on.

use crate::radio::RadioSocket;
use crate::session::SourceId;
use crate::wire::RadioAddress;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Peer {0} not found")]
    NotFound(RadioAddress),

    #[error("Connection to {address} already in progress ({state})")]
    AlreadyInProgress { address: RadioAddress, state: PeerState },

    #[error("Invalid transition for {address}: {from} -> {to}")]
    InvalidTransition {
        address: RadioAddress,
        from: PeerState,
        to: PeerState,
    },

    #[error("Peer {address} is {state}, disconnect it first")]
    Busy { address: RadioAddress, state: PeerState },
}

/// Connection state of a peer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PeerState {
    /// Known but not connected
    Offline,
    /// Connect request issued, waiting for the link
    Paging,
    /// Link up, session bridge relaying
    Online,
}

impl PeerState {
    fn index(self) -> usize {
        match self {
            Self::Offline => 0,
            Self::Paging => 1,
            Self::Online => 2,
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("offline"),
            Self::Paging => f.write_str("paging"),
            Self::Online => f.write_str("online"),
        }
    }
}

/// Per-state peer counts
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PeerStats {
    pub offline: usize,
    pub paging: usize,
    pub online: usize,
}

impl PeerStats {
    pub fn total(&self) -> usize {
        self.offline + self.paging + self.online
    }
}

/// A known radio device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    address: RadioAddress,
    alias: String,
    state: PeerState,
    paired: bool,
    radio_socket: Option<RadioSocket>,
    upstream_socket: Option<SourceId>,
}

impl Peer {
    fn new(address: RadioAddress, alias: &str, paired: bool) -> Self {
        Self {
            address,
            alias: alias.to_string(),
            state: PeerState::Offline,
            paired,
            radio_socket: None,
            upstream_socket: None,
        }
    }

    /// Get the device address
    pub fn address(&self) -> &RadioAddress {
        &self.address
    }

    /// Get the display name
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Get the connection state
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Check if the device is paired with this gateway
    pub fn is_paired(&self) -> bool {
        self.paired
    }

    /// Radio data socket, while online
    pub fn radio_socket(&self) -> Option<RadioSocket> {
        self.radio_socket
    }

    /// Upstream socket (bridge source) while online
    pub fn upstream_socket(&self) -> Option<SourceId> {
        self.upstream_socket
    }
}

/// Registry of known peers
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<RadioAddress, Peer>,
    counts: [usize; 3],
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new offline peer; an existing record is kept as is
    ///
    /// Registering an already known, unpaired device as paired marks it paired.
    /// Returns `true` if a new record was created.
    pub fn register_known(&mut self, address: RadioAddress, alias: &str, paired: bool) -> bool {
        if let Some(peer) = self.peers.get_mut(&address) {
            if paired {
                peer.paired = true;
            }
            return false;
        }

        self.peers.insert(address, Peer::new(address, alias, paired));
        self.counts[PeerState::Offline.index()] += 1;
        true
    }

    /// Look up a peer in any partition
    pub fn lookup(&self, address: &RadioAddress) -> Option<&Peer> {
        self.peers.get(address)
    }

    /// State of a peer, if known
    pub fn state_of(&self, address: &RadioAddress) -> Option<PeerState> {
        self.peers.get(address).map(|p| p.state)
    }

    /// Offline -> Paging
    pub fn mark_paging(&mut self, address: &RadioAddress) -> Result<(), RegistryError> {
        let peer = self
            .peers
            .get_mut(address)
            .ok_or(RegistryError::NotFound(*address))?;

        match peer.state {
            PeerState::Offline => {
                Self::transition(&mut self.counts, peer, PeerState::Paging);
                Ok(())
            }
            state => Err(RegistryError::AlreadyInProgress {
                address: *address,
                state,
            }),
        }
    }

    /// Paging -> Online, attaching the session's sockets
    pub fn mark_online(
        &mut self,
        address: &RadioAddress,
        radio_socket: RadioSocket,
        upstream_socket: SourceId,
    ) -> Result<(), RegistryError> {
        let peer = self
            .peers
            .get_mut(address)
            .ok_or(RegistryError::NotFound(*address))?;

        if peer.state != PeerState::Paging {
            return Err(RegistryError::InvalidTransition {
                address: *address,
                from: peer.state,
                to: PeerState::Online,
            });
        }

        peer.radio_socket = Some(radio_socket);
        peer.upstream_socket = Some(upstream_socket);
        Self::transition(&mut self.counts, peer, PeerState::Online);
        Ok(())
    }

    /// Paging/Online -> Offline, detaching sockets
    ///
    /// Closing the sockets is the caller's job. Returns the previous state.
    pub fn mark_offline(&mut self, address: &RadioAddress) -> Result<PeerState, RegistryError> {
        let peer = self
            .peers
            .get_mut(address)
            .ok_or(RegistryError::NotFound(*address))?;

        let previous = peer.state;
        peer.radio_socket = None;
        peer.upstream_socket = None;
        Self::transition(&mut self.counts, peer, PeerState::Offline);
        Ok(previous)
    }

    /// Set or clear the pairing flag
    pub fn set_paired(&mut self, address: &RadioAddress, paired: bool) -> Result<(), RegistryError> {
        let peer = self
            .peers
            .get_mut(address)
            .ok_or(RegistryError::NotFound(*address))?;
        peer.paired = paired;
        Ok(())
    }

    /// Forget an offline peer (explicit unpairing)
    pub fn unregister(&mut self, address: &RadioAddress) -> Result<Peer, RegistryError> {
        let state = self
            .state_of(address)
            .ok_or(RegistryError::NotFound(*address))?;
        if state != PeerState::Offline {
            return Err(RegistryError::Busy {
                address: *address,
                state,
            });
        }

        let peer = self
            .peers
            .remove(address)
            .ok_or(RegistryError::NotFound(*address))?;
        self.counts[state.index()] -= 1;
        Ok(peer)
    }

    fn transition(counts: &mut [usize; 3], peer: &mut Peer, to: PeerState) {
        counts[peer.state.index()] -= 1;
        counts[to.index()] += 1;
        peer.state = to;
    }

    /// Number of peers in a state
    pub fn count(&self, state: PeerState) -> usize {
        self.counts[state.index()]
    }

    /// Peers holding a connection slot (paging or online)
    pub fn active_count(&self) -> usize {
        self.count(PeerState::Paging) + self.count(PeerState::Online)
    }

    /// Total number of known peers
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Iterate over all peers
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Addresses of peers in a state
    pub fn addresses_in(&self, state: PeerState) -> Vec<RadioAddress> {
        self.peers
            .values()
            .filter(|p| p.state == state)
            .map(|p| p.address)
            .collect()
    }

    /// Get statistics
    pub fn stats(&self) -> PeerStats {
        PeerStats {
            offline: self.count(PeerState::Offline),
            paging: self.count(PeerState::Paging),
            online: self.count(PeerState::Online),
        }
    }

    /// Drop every peer
    pub fn clear(&mut self) {
        self.peers.clear();
        self.counts = [0; 3];
    }
}
