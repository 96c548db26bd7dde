// Adapter Context - Local radio identity and gateway tunables

use crate::admission::DEFAULT_MAX_PEERS;
use crate::beacon::BCAST_TIMEOUT_MS;
use crate::config::{GatewayConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SWEEP_INTERVAL_SECS};
use crate::radio::{RadioConfig, TxPower};
use crate::wire::RadioAddress;
use serde::Serialize;
use std::time::Duration;

/// The local adapter as seen by the admin surface
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdapterContext {
    pub address: RadioAddress,
    pub channel: u8,
    pub power: TxPower,
    pub powered: bool,
    pub max_peers: usize,
}

impl AdapterContext {
    pub fn new(radio: &RadioConfig, max_peers: usize) -> Self {
        Self {
            address: radio.address,
            channel: radio.channel,
            power: radio.power,
            powered: false,
            max_peers,
        }
    }
}

/// Event loop tunables
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Peers allowed to hold a radio connection slot
    pub max_peers: usize,
    /// Age at which a beacon is forgotten
    pub beacon_timeout_ms: u64,
    /// How often stale beacons are swept
    pub sweep_interval: Duration,
    /// How often the sockets are polled
    pub poll_interval: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
            beacon_timeout_ms: BCAST_TIMEOUT_MS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl GatewaySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_peers: config.gateway.max_peers,
            beacon_timeout_ms: config.gateway.beacon_timeout_ms,
            sweep_interval: config.sweep_interval(),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    pub fn with_beacon_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.beacon_timeout_ms = timeout_ms;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
