// Config module - SETTINGS
// JSON configuration file, defaults and command line overrides

mod file;

pub use file::{
    ConfigError, GatewayConfig, GatewaySection, Overrides, RadioSection,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_SPI_DEVICE, DEFAULT_SWEEP_INTERVAL_SECS,
};
