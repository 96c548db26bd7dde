// Wire module - MANAGEMENT CHANNEL FRAMING
// Radio addresses and the opcode + payload frames read from the management socket

mod address;
mod frame;

pub use address::{AddressError, RadioAddress};
pub use frame::{
    advertised_name, decode, Frame, WireError,
    EVENT_FLAG, HEADER_SIZE, MGMT_BUFFER_SIZE, PRESENCE_FIXED_SIZE,
    OP_EVT_BCAST_BEACON, OP_EVT_BCAST_PRESENCE, OP_EVT_BCAST_SETUP,
    OP_EVT_CONNECTED, OP_EVT_DISCONNECTED,
};
