// Session Bridge - Relay between one radio data socket and one upstream socket
//
// Each direction owns a single fixed buffer. A direction only reads again once
// the chunk it holds has been written out completely, so a slow writer stalls
// its reader instead of growing a queue.

use crate::radio::{Radio, RadioError, RadioSocket};
use crate::upstream::UpstreamLink;
use crate::wire::RadioAddress;
use serde::Serialize;
use std::fmt;
use std::io;
use tracing::{debug, warn};

/// Relay buffer for radio -> upstream
pub const RADIO_TO_UPSTREAM_BUFFER: usize = 256;

/// Relay buffer for upstream -> radio
pub const UPSTREAM_TO_RADIO_BUFFER: usize = 128;

// ============================================================================
// CLOSE REASON
// ============================================================================

/// Why a bridge was torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The upstream service closed its end
    UpstreamClosed,
    /// Reading or writing the upstream socket failed
    UpstreamError(String),
    /// The radio link failed
    RadioLost(RadioError),
    /// The radio reported the device disconnected
    Disconnected,
    /// The connect request failed
    ConnectFailed(String),
    /// The device was unpaired
    Unpaired,
    /// The gateway is stopping
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamClosed => f.write_str("upstream closed"),
            Self::UpstreamError(e) => write!(f, "upstream error: {}", e),
            Self::RadioLost(e) => write!(f, "radio link lost: {}", e),
            Self::Disconnected => f.write_str("peer disconnected"),
            Self::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            Self::Unpaired => f.write_str("device unpaired"),
            Self::Shutdown => f.write_str("gateway shutdown"),
        }
    }
}

// ============================================================================
// STATS AND OUTCOME
// ============================================================================

/// Byte counters for one bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Bytes read from the radio and written upstream
    pub bytes_to_upstream: u64,
    /// Bytes read upstream and written to the radio
    pub bytes_to_radio: u64,
}

/// Result of servicing a bridge once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Bytes read from the radio during this pass
    pub radio_bytes: usize,
    /// Bytes read from upstream during this pass
    pub upstream_bytes: usize,
    /// Set when the bridge must be torn down
    pub closed: Option<CloseReason>,
}

// ============================================================================
// RELAY BUFFER
// ============================================================================

#[derive(Debug)]
struct RelayBuffer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl RelayBuffer {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size],
            start: 0,
            end: 0,
        }
    }

    fn is_pending(&self) -> bool {
        self.start < self.end
    }

    fn pending(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn filled(&mut self, n: usize) {
        self.start = 0;
        self.end = n;
    }

    fn consumed(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }
}

// ============================================================================
// SESSION BRIDGE
// ============================================================================

/// Live relay for one peer; owns both sockets until teardown
pub struct SessionBridge<L: UpstreamLink> {
    address: RadioAddress,
    radio_socket: Option<RadioSocket>,
    upstream: Option<L>,
    to_upstream: RelayBuffer,
    to_radio: RelayBuffer,
    stats: BridgeStats,
}

impl<L: UpstreamLink> SessionBridge<L> {
    pub fn new(address: RadioAddress, radio_socket: RadioSocket, upstream: L) -> Self {
        Self {
            address,
            radio_socket: Some(radio_socket),
            upstream: Some(upstream),
            to_upstream: RelayBuffer::new(RADIO_TO_UPSTREAM_BUFFER),
            to_radio: RelayBuffer::new(UPSTREAM_TO_RADIO_BUFFER),
            stats: BridgeStats::default(),
        }
    }

    /// Address of the peer this bridge serves
    pub fn address(&self) -> &RadioAddress {
        &self.address
    }

    /// Radio data socket, until teardown
    pub fn radio_socket(&self) -> Option<RadioSocket> {
        self.radio_socket
    }

    /// Check if both sockets are still held
    pub fn is_open(&self) -> bool {
        self.radio_socket.is_some() && self.upstream.is_some()
    }

    /// Get the byte counters
    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// One non-blocking pass in each direction
    pub fn service<R: Radio>(&mut self, radio: &mut R) -> PollOutcome {
        let mut outcome = PollOutcome::default();

        let (Some(socket), Some(upstream)) = (self.radio_socket, self.upstream.as_mut()) else {
            outcome.closed = Some(CloseReason::Shutdown);
            return outcome;
        };

        // radio -> upstream
        if !self.to_upstream.is_pending() {
            match radio.read(socket, &mut self.to_upstream.buf) {
                Ok(n) => {
                    self.to_upstream.filled(n);
                    outcome.radio_bytes = n;
                }
                Err(RadioError::WouldBlock) => {}
                Err(e) => {
                    outcome.closed = Some(CloseReason::RadioLost(e));
                    return outcome;
                }
            }
        }
        if self.to_upstream.is_pending() {
            match upstream.try_write(self.to_upstream.pending()) {
                Ok(n) => {
                    self.to_upstream.consumed(n);
                    self.stats.bytes_to_upstream += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    warn!(address = %self.address, error = %e, "write to upstream failed");
                    outcome.closed = Some(CloseReason::UpstreamError(e.to_string()));
                    return outcome;
                }
            }
        }

        // upstream -> radio
        if !self.to_radio.is_pending() {
            match upstream.try_read(&mut self.to_radio.buf) {
                Ok(0) => {
                    outcome.closed = Some(CloseReason::UpstreamClosed);
                    return outcome;
                }
                Ok(n) => {
                    self.to_radio.filled(n);
                    outcome.upstream_bytes = n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    warn!(address = %self.address, error = %e, "read from upstream failed");
                    outcome.closed = Some(CloseReason::UpstreamError(e.to_string()));
                    return outcome;
                }
            }
        }
        if self.to_radio.is_pending() {
            match radio.write(socket, self.to_radio.pending()) {
                Ok(n) => {
                    self.to_radio.consumed(n);
                    self.stats.bytes_to_radio += n as u64;
                }
                Err(RadioError::WouldBlock) => {}
                Err(e) => {
                    outcome.closed = Some(CloseReason::RadioLost(e));
                    return outcome;
                }
            }
        }

        outcome
    }

    /// Close both sockets; later calls do nothing
    ///
    /// Returns `true` if anything was closed by this call.
    pub fn teardown<R: Radio>(&mut self, radio: &mut R, reason: &CloseReason) -> bool {
        let radio_socket = self.radio_socket.take();
        let upstream = self.upstream.take();
        if radio_socket.is_none() && upstream.is_none() {
            return false;
        }

        if let Some(socket) = radio_socket {
            radio.close(socket);
        }
        drop(upstream);

        debug!(
            address = %self.address,
            reason = %reason,
            to_upstream = self.stats.bytes_to_upstream,
            to_radio = self.stats.bytes_to_radio,
            "bridge closed"
        );
        true
    }
}

impl<L: UpstreamLink> fmt::Debug for SessionBridge<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBridge")
            .field("address", &self.address)
            .field("radio_socket", &self.radio_socket)
            .field("upstream_open", &self.upstream.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}
