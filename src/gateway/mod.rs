// Gateway module - THE REACTOR
// Event loop tying the radio, peers, bridges and admin commands together

mod admin;
mod context;
mod event_loop;

pub use admin::{AdminCommand, GatewayHandle, GatewayStatus, PeerSummary, ADMIN_CHANNEL_CAPACITY};
pub use context::{AdapterContext, GatewaySettings};
pub use event_loop::{Gateway, GatewayError};
