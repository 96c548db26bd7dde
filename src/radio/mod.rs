// Radio module - THE AIR (abstract)
// HAL-style socket API over the radio and a simulated backend

mod traits;
mod sim;

pub use traits::{
    // Core trait
    Radio,
    // Configuration
    RadioConfig, TxPower,
    // Socket types
    RadioProtocol, RadioSocket,
    // State and errors
    RadioError, RadioState,
    // Limits
    MAX_CHANNEL, DEFAULT_CHANNEL,
};

pub use sim::{SimulatedRadio, SIM_MAX_SOCKETS};
