// Radio Traits and Core Types
// Defines the socket-oriented Radio trait the gateway drives, plus its config and errors

use crate::wire::RadioAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Highest valid radio channel
pub const MAX_CHANNEL: u8 = 125;

/// Channel used when none is configured
pub const DEFAULT_CHANNEL: u8 = 76;

// ============================================================================
// TX POWER
// ============================================================================

/// Transmit power level supported by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TxPower {
    /// -18 dBm
    Min,
    /// -12 dBm
    Low,
    /// -6 dBm
    Medium,
    /// 0 dBm
    #[default]
    Max,
}

impl TxPower {
    /// Map a dBm value to a supported level; unsupported values select 0 dBm
    pub fn from_dbm(dbm: i32) -> Self {
        match dbm {
            -18 => Self::Min,
            -12 => Self::Low,
            -6 => Self::Medium,
            _ => Self::Max,
        }
    }

    /// Get power in dBm
    pub fn dbm(self) -> i8 {
        match self {
            Self::Min => -18,
            Self::Low => -12,
            Self::Medium => -6,
            Self::Max => 0,
        }
    }
}

// ============================================================================
// RADIO CONFIG
// ============================================================================

/// Configuration handed to the radio at init
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Interface name
    pub name: String,
    /// Local radio address
    pub address: RadioAddress,
    /// RF channel (0..=125)
    pub channel: u8,
    /// Transmit power
    pub power: TxPower,
    /// SPI device the transceiver is wired to
    pub spi_device: String,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            name: "nrf0".to_string(),
            address: RadioAddress::ZERO,
            channel: DEFAULT_CHANNEL,
            power: TxPower::default(),
            spi_device: "/dev/spidev0.0".to_string(),
        }
    }
}

impl RadioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: RadioAddress) -> Self {
        self.address = address;
        self
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_power(mut self, power: TxPower) -> Self {
        self.power = power;
        self
    }

    pub fn with_spi_device(mut self, device: &str) -> Self {
        self.spi_device = device.to_string();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RadioError> {
        if self.channel > MAX_CHANNEL {
            return Err(RadioError::InvalidConfig(format!(
                "channel {} out of range 0..={}",
                self.channel, MAX_CHANNEL
            )));
        }
        if self.address.is_zero() {
            return Err(RadioError::InvalidConfig("local address is unassigned".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SOCKETS
// ============================================================================

/// Kind of radio socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioProtocol {
    /// Management channel carrying events
    Mgmt,
    /// Raw data channel to a single device
    Raw,
}

/// Handle to an open radio socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RadioSocket(u32);

impl RadioSocket {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RadioSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rsk{}", self.0)
    }
}

// ============================================================================
// RADIO STATE
// ============================================================================

/// State of the radio hardware
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RadioState {
    #[default]
    Stopped,
    Running,
    Error(String),
}

impl RadioState {
    /// Check if the radio is running
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

// ============================================================================
// RADIO ERRORS
// ============================================================================

/// Errors that can occur in the radio layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("Radio not initialized")]
    NotInitialized,

    #[error("Radio already initialized")]
    AlreadyInitialized,

    #[error("Operation would block")]
    WouldBlock,

    #[error("Bad socket: {0}")]
    BadSocket(RadioSocket),

    #[error("No free radio sockets")]
    SocketLimit,

    #[error("Socket not connected")]
    NotConnected,

    #[error("Link disconnected")]
    Disconnected,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Hardware unavailable")]
    HardwareUnavailable,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RadioError {
    /// Check if the error means the link or socket is gone
    pub fn is_link_lost(&self) -> bool {
        matches!(self, Self::Disconnected | Self::NotConnected | Self::BadSocket(_))
    }
}

// ============================================================================
// RADIO TRAIT
// ============================================================================

/// Socket-oriented access to the radio
///
/// Every call is non-blocking: reads with nothing pending return
/// [`RadioError::WouldBlock`].
pub trait Radio {
    /// Bring up the radio with the given configuration
    fn init(&mut self, config: &RadioConfig) -> Result<(), RadioError>;

    /// Shut the radio down, releasing every socket
    fn deinit(&mut self);

    /// Open a socket of the given kind
    fn socket(&mut self, protocol: RadioProtocol) -> Result<RadioSocket, RadioError>;

    /// Read one frame or chunk into `buf`
    fn read(&mut self, socket: RadioSocket, buf: &mut [u8]) -> Result<usize, RadioError>;

    /// Write bytes to the socket
    fn write(&mut self, socket: RadioSocket, data: &[u8]) -> Result<usize, RadioError>;

    /// Issue a connect request towards `peer`; returns immediately
    fn connect(&mut self, socket: RadioSocket, peer: &RadioAddress) -> Result<(), RadioError>;

    /// Close a socket
    fn close(&mut self, socket: RadioSocket);

    /// Current radio state
    fn state(&self) -> RadioState;
}
