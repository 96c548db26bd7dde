// Admin Handle - Commands into a running gateway
//
// The event loop owns all state; other tasks talk to it through this channel.

use super::context::AdapterContext;
use super::event_loop::GatewayError;
use crate::beacon::BeaconEntry;
use crate::peer::{PeerState, PeerStats};
use crate::wire::RadioAddress;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Queue depth of the admin channel
pub const ADMIN_CHANNEL_CAPACITY: usize = 32;

/// Snapshot of one peer
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerSummary {
    pub address: RadioAddress,
    pub alias: String,
    pub state: PeerState,
    pub paired: bool,
}

/// Snapshot of the gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub adapter: AdapterContext,
    pub stats: PeerStats,
    pub peers: Vec<PeerSummary>,
    pub beacons: Vec<BeaconEntry>,
    pub bridges: usize,
}

/// Requests handled by the event loop
#[derive(Debug)]
pub enum AdminCommand {
    Status {
        reply: oneshot::Sender<GatewayStatus>,
    },
    Pair {
        address: RadioAddress,
        alias: String,
        reply: oneshot::Sender<Result<(), GatewayError>>,
    },
    RemoveDevice {
        address: RadioAddress,
        reply: oneshot::Sender<Result<bool, GatewayError>>,
    },
    Shutdown,
}

/// Cloneable handle to a gateway's event loop
#[derive(Clone, Debug)]
pub struct GatewayHandle {
    tx: mpsc::Sender<AdminCommand>,
}

impl GatewayHandle {
    pub(crate) fn new(tx: mpsc::Sender<AdminCommand>) -> Self {
        Self { tx }
    }

    async fn send(&self, command: AdminCommand) -> Result<(), GatewayError> {
        self.tx.send(command).await.map_err(|_| GatewayError::Stopped)
    }

    /// Adapter properties, peers and beacons
    pub async fn status(&self) -> Result<GatewayStatus, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::Status { reply }).await?;
        rx.await.map_err(|_| GatewayError::Stopped)
    }

    /// Mark a device as paired and persist it
    pub async fn pair(&self, address: RadioAddress, alias: &str) -> Result<(), GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::Pair {
            address,
            alias: alias.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| GatewayError::Stopped)?
    }

    /// Drop a device's session, forget it and delete its pairing
    pub async fn remove_device(&self, address: RadioAddress) -> Result<bool, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::RemoveDevice { address, reply }).await?;
        rx.await.map_err(|_| GatewayError::Stopped)?
    }

    /// Ask the event loop to stop
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        self.send(AdminCommand::Shutdown).await
    }
}
