// Admission Controller - Capacity and identity checks for presence events
//
// Checks run in a fixed order; the first that matches decides:
// capacity, already paging, already online (clone), unknown, unpaired, proceed.

use crate::peer::{PeerRegistry, PeerState, RegistryError};
use crate::wire::RadioAddress;
use thiserror::Error;
use tracing::{debug, warn};

/// Default ceiling on peers holding a radio connection slot
pub const DEFAULT_MAX_PEERS: usize = 5;

/// Rejected admissions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Capacity exceeded: {active}/{max} peers active")]
    CapacityExceeded { active: usize, max: usize },

    #[error("{0} is already online, possible cloned address")]
    IdentityConflict(RadioAddress),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Outcome of an accepted presence event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A connection attempt is already underway
    InProgress,
    /// First sighting, recorded as an unpaired offline peer
    Registered,
    /// Known but not paired yet
    AwaitingPairing,
    /// Paired and offline, go ahead and connect
    Proceed,
}

impl Admission {
    /// Check if the caller should start a connection
    pub fn should_connect(self) -> bool {
        self == Self::Proceed
    }
}

/// Admission policy
#[derive(Clone, Debug)]
pub struct AdmissionController {
    max_peers: usize,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PEERS)
    }
}

impl AdmissionController {
    pub fn new(max_peers: usize) -> Self {
        Self { max_peers }
    }

    /// Get the capacity ceiling
    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    /// Judge a presence event for `address`
    ///
    /// Only registration of a first sighting mutates the registry; the caller
    /// performs the Paging transition once its sockets are open.
    pub fn admit(
        &self,
        registry: &mut PeerRegistry,
        address: RadioAddress,
        alias: &str,
    ) -> Result<Admission, AdmissionError> {
        let active = registry.active_count();
        if active >= self.max_peers {
            debug!(address = %address, active, max = self.max_peers, "capacity exceeded");
            return Err(AdmissionError::CapacityExceeded {
                active,
                max: self.max_peers,
            });
        }

        let Some(peer) = registry.lookup(&address) else {
            registry.register_known(address, alias, false);
            debug!(address = %address, alias, "new device registered");
            return Ok(Admission::Registered);
        };

        match peer.state() {
            PeerState::Paging => Ok(Admission::InProgress),
            PeerState::Online => {
                warn!(address = %address, "presence from online peer, possible cloned address");
                Err(AdmissionError::IdentityConflict(address))
            }
            PeerState::Offline if !peer.is_paired() => Ok(Admission::AwaitingPairing),
            PeerState::Offline => Ok(Admission::Proceed),
        }
    }
}
