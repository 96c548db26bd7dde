// Frame Codec - Management channel frames
// Little-endian u16 opcode followed by an opcode-specific payload, one frame per read

use super::address::RadioAddress;
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Bit set on every event opcode
pub const EVENT_FLAG: u16 = 0x0200;

pub const OP_EVT_BCAST_PRESENCE: u16 = 0x0201;
pub const OP_EVT_BCAST_SETUP: u16 = 0x0202;
pub const OP_EVT_BCAST_BEACON: u16 = 0x0203;
pub const OP_EVT_CONNECTED: u16 = 0x0204;
pub const OP_EVT_DISCONNECTED: u16 = 0x0205;

/// Size of the frame header (opcode)
pub const HEADER_SIZE: usize = 2;

/// Fixed part of the presence payload (address), the name follows it
pub const PRESENCE_FIXED_SIZE: usize = RadioAddress::SIZE;

/// Fixed size of the connected payload (peer + local address)
const CONNECTED_SIZE: usize = 2 * RadioAddress::SIZE;

/// Fixed size of the disconnected payload (address)
const DISCONNECTED_SIZE: usize = RadioAddress::SIZE;

/// Size of the buffer used for a single management read
pub const MGMT_BUFFER_SIZE: usize = 256;

// ============================================================================
// ERRORS
// ============================================================================

/// Reasons a management frame is dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Frame too short: {0} bytes")]
    TooShort(usize),

    #[error("Not an event opcode: 0x{0:04x}")]
    NotAnEvent(u16),

    #[error("Unknown event opcode: 0x{0:04x}")]
    UnknownOpcode(u16),

    #[error("Truncated payload for opcode 0x{opcode:04x}: {len} bytes")]
    TruncatedPayload { opcode: u16, len: usize },
}

// ============================================================================
// FRAME
// ============================================================================

/// A decoded management event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A device is advertising its presence
    Presence {
        address: RadioAddress,
        /// Raw advertised name, exactly as received
        name: Vec<u8>,
    },
    /// Setup broadcast, payload unused by the gateway
    SetupBroadcast,
    /// Generic broadcast, payload unused by the gateway
    Broadcast,
    /// The radio link layer confirmed a connection
    Connected {
        peer: RadioAddress,
        local: RadioAddress,
    },
    /// The radio link to a device went away
    Disconnected { address: RadioAddress },
}

impl Frame {
    /// Opcode of this frame
    pub fn opcode(&self) -> u16 {
        match self {
            Self::Presence { .. } => OP_EVT_BCAST_PRESENCE,
            Self::SetupBroadcast => OP_EVT_BCAST_SETUP,
            Self::Broadcast => OP_EVT_BCAST_BEACON,
            Self::Connected { .. } => OP_EVT_CONNECTED,
            Self::Disconnected { .. } => OP_EVT_DISCONNECTED,
        }
    }

    /// Encode into wire bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + CONNECTED_SIZE);
        out.extend_from_slice(&self.opcode().to_le_bytes());

        match self {
            Self::Presence { address, name } => {
                out.extend_from_slice(address.as_bytes());
                out.extend_from_slice(name);
            }
            Self::SetupBroadcast | Self::Broadcast => {}
            Self::Connected { peer, local } => {
                out.extend_from_slice(peer.as_bytes());
                out.extend_from_slice(local.as_bytes());
            }
            Self::Disconnected { address } => {
                out.extend_from_slice(address.as_bytes());
            }
        }
        out
    }
}

/// Decode one management frame of `buf.len()` received bytes
pub fn decode(buf: &[u8]) -> Result<Frame, WireError> {
    if buf.len() < HEADER_SIZE {
        return Err(WireError::TooShort(buf.len()));
    }

    let opcode = u16::from_le_bytes([buf[0], buf[1]]);
    if opcode & EVENT_FLAG == 0 {
        return Err(WireError::NotAnEvent(opcode));
    }

    let payload = &buf[HEADER_SIZE..];
    let truncated = || WireError::TruncatedPayload { opcode, len: payload.len() };

    match opcode {
        OP_EVT_BCAST_PRESENCE => {
            let address = RadioAddress::from_slice(payload).map_err(|_| truncated())?;
            // name length = received - header - fixed payload
            let name = payload[PRESENCE_FIXED_SIZE..].to_vec();
            Ok(Frame::Presence { address, name })
        }
        OP_EVT_BCAST_SETUP => Ok(Frame::SetupBroadcast),
        OP_EVT_BCAST_BEACON => Ok(Frame::Broadcast),
        OP_EVT_CONNECTED => {
            if payload.len() < CONNECTED_SIZE {
                return Err(truncated());
            }
            let peer = RadioAddress::from_slice(&payload[..RadioAddress::SIZE]).map_err(|_| truncated())?;
            let local = RadioAddress::from_slice(&payload[RadioAddress::SIZE..]).map_err(|_| truncated())?;
            Ok(Frame::Connected { peer, local })
        }
        OP_EVT_DISCONNECTED => {
            if payload.len() < DISCONNECTED_SIZE {
                return Err(truncated());
            }
            let address = RadioAddress::from_slice(payload).map_err(|_| truncated())?;
            Ok(Frame::Disconnected { address })
        }
        other => Err(WireError::UnknownOpcode(other)),
    }
}

/// Validate an advertised device name
///
/// Trailing NUL padding is ignored. Returns `None` when the remaining bytes are
/// empty or not well-formed UTF-8.
pub fn advertised_name(raw: &[u8]) -> Option<&str> {
    let end = raw.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
    let trimmed = &raw[..end];
    if trimmed.is_empty() {
        return None;
    }
    std::str::from_utf8(trimmed).ok()
}
