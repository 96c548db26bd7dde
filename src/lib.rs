// nrfgate - Gateway between low-power radio devices and a local upstream service
//
// Devices advertise themselves over the radio management channel; paired
// devices are connected and their byte streams relayed to the upstream service.

pub mod admission;
pub mod beacon;
pub mod config;
pub mod gateway;
pub mod peer;
pub mod radio;
pub mod session;
pub mod storage;
pub mod upstream;
pub mod wire;

pub use admission::{Admission, AdmissionController, AdmissionError};
pub use config::{ConfigError, GatewayConfig};
pub use gateway::{Gateway, GatewayError, GatewayHandle, GatewaySettings};
pub use radio::{Radio, RadioConfig, SimulatedRadio};
pub use upstream::{Connector, UpstreamConnector, UpstreamTarget};
pub use wire::{Frame, RadioAddress};
