// Session module - THE RELAY
// Per-peer byte bridges between radio data sockets and upstream sockets

mod bridge;
mod table;

pub use bridge::{
    BridgeStats, CloseReason, PollOutcome, SessionBridge,
    RADIO_TO_UPSTREAM_BUFFER, UPSTREAM_TO_RADIO_BUFFER,
};
pub use table::{SourceId, SourceTable};
