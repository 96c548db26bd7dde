// Gateway Config - JSON configuration file
//
// {
//   "radio":    { "channel": 76, "TxPower": 0, "mac": "01:02:03:04:05:06:07:08" },
//   "gateway":  { "max_peers": 5, "beacon_timeout_ms": 10000, ... },
//   "upstream": { "type": "unix", "name": "knot" }
// }

use crate::admission::DEFAULT_MAX_PEERS;
use crate::beacon::BCAST_TIMEOUT_MS;
use crate::radio::{RadioConfig, TxPower, DEFAULT_CHANNEL, MAX_CHANNEL};
use crate::upstream::UpstreamTarget;
use crate::wire::RadioAddress;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default SPI device of the transceiver
pub const DEFAULT_SPI_DEVICE: &str = "/dev/spidev0.0";

/// Default beacon sweep period
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;

/// Default event loop poll tick
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// SECTIONS
// ============================================================================

/// `radio` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioSection {
    #[serde(default = "default_channel")]
    pub channel: i32,

    /// Transmit power in dBm
    #[serde(rename = "TxPower", default)]
    pub tx_power: i32,

    /// Local radio address; generated on first start when missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<RadioAddress>,

    #[serde(default = "default_spi")]
    pub spi: String,
}

fn default_channel() -> i32 {
    DEFAULT_CHANNEL as i32
}

fn default_spi() -> String {
    DEFAULT_SPI_DEVICE.to_string()
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            tx_power: 0,
            mac: None,
            spi: default_spi(),
        }
    }
}

/// `gateway` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    #[serde(default = "default_beacon_timeout")]
    pub beacon_timeout_ms: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pairing database directory
    #[serde(default = "default_pairing_db")]
    pub pairing_db: PathBuf,
}

fn default_max_peers() -> usize {
    DEFAULT_MAX_PEERS
}

fn default_beacon_timeout() -> u64 {
    BCAST_TIMEOUT_MS
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_pairing_db() -> PathBuf {
    PathBuf::from("nrfgate-pairings")
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            max_peers: default_max_peers(),
            beacon_timeout_ms: default_beacon_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            poll_interval_ms: default_poll_interval(),
            pairing_db: default_pairing_db(),
        }
    }
}

// ============================================================================
// GATEWAY CONFIG
// ============================================================================

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub radio: RadioSection,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub upstream: UpstreamTarget,
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the file (defaults if it does not exist) and make sure it names a
    /// local address, persisting a freshly generated one
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        if config.ensure_address() {
            info!(path = %path.display(), address = ?config.radio.mac, "generated radio address");
            config.to_file(path)?;
        }
        Ok(config)
    }

    /// Generate a random local address if none is set; returns whether one was
    pub fn ensure_address(&mut self) -> bool {
        match self.radio.mac {
            Some(mac) if !mac.is_zero() => false,
            _ => {
                self.radio.mac = Some(RadioAddress::generate());
                true
            }
        }
    }

    /// Local radio address, all-zero when unset
    pub fn address(&self) -> RadioAddress {
        self.radio.mac.unwrap_or(RadioAddress::ZERO)
    }

    /// Transmit power level for the configured dBm
    pub fn tx_power(&self) -> TxPower {
        TxPower::from_dbm(self.radio.tx_power)
    }

    pub fn beacon_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.beacon_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.gateway.sweep_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.gateway.poll_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_CHANNEL as i32).contains(&self.radio.channel) {
            return Err(ConfigError::InvalidValue(format!(
                "channel {} outside 0..={}",
                self.radio.channel, MAX_CHANNEL
            )));
        }
        if self.gateway.max_peers == 0 {
            return Err(ConfigError::InvalidValue("max_peers cannot be 0".into()));
        }
        if self.gateway.beacon_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "beacon_timeout_ms cannot be 0".into(),
            ));
        }
        if self.gateway.sweep_interval_secs == 0 || self.gateway.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "sweep and poll intervals cannot be 0".into(),
            ));
        }
        Ok(())
    }

    /// Radio settings derived from this file
    pub fn radio_config(&self) -> Result<RadioConfig, ConfigError> {
        self.validate()?;
        let channel = u8::try_from(self.radio.channel)
            .map_err(|_| ConfigError::InvalidValue(format!("channel {}", self.radio.channel)))?;

        Ok(RadioConfig::new()
            .with_address(self.address())
            .with_channel(channel)
            .with_power(self.tx_power())
            .with_spi_device(&self.radio.spi))
    }
}

// ============================================================================
// OVERRIDES
// ============================================================================

/// Command line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub channel: Option<i32>,
    pub tx_power: Option<i32>,
    pub spi: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub pairing_db: Option<PathBuf>,
}

impl Overrides {
    /// Default upstream TCP port in host mode
    pub const DEFAULT_PORT: u16 = 8081;

    /// Merge into `config`
    ///
    /// A channel outside the valid range is ignored and the file value kept.
    /// Giving a host switches the upstream to TCP.
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(channel) = self.channel.filter(|c| (0..=MAX_CHANNEL as i32).contains(c)) {
            config.radio.channel = channel;
        }
        if let Some(dbm) = self.tx_power {
            config.radio.tx_power = dbm;
        }
        if let Some(spi) = &self.spi {
            config.radio.spi = spi.clone();
        }
        if let Some(path) = &self.pairing_db {
            config.gateway.pairing_db = path.clone();
        }
        if let Some(host) = &self.host {
            let port = self.port.unwrap_or(Self::DEFAULT_PORT);
            config.upstream = UpstreamTarget::tcp(host, port);
        }
    }
}
