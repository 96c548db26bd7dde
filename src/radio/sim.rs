// Simulated Radio
// In-memory radio used when no transceiver driver is available, and by the test suite

use crate::radio::{Radio, RadioConfig, RadioError, RadioProtocol, RadioSocket, RadioState};
use crate::wire::{Frame, RadioAddress};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

/// Sockets the simulated transceiver can hold open at once (management + 5 data pipes)
pub const SIM_MAX_SOCKETS: usize = 6;

// ============================================================================
// INTERNAL STATE
// ============================================================================

#[derive(Debug)]
struct SimSocket {
    protocol: RadioProtocol,
    peer: Option<RadioAddress>,
}

#[derive(Debug, Default)]
struct SimState {
    state: RadioState,
    config: Option<RadioConfig>,
    next_socket: u32,
    max_sockets: usize,
    sockets: HashMap<RadioSocket, SimSocket>,
    mgmt_queue: VecDeque<Vec<u8>>,
    device_rx: HashMap<RadioAddress, VecDeque<Vec<u8>>>,
    device_tx: HashMap<RadioAddress, Vec<Vec<u8>>>,
    dropped_links: HashSet<RadioAddress>,
    connect_requests: Vec<RadioAddress>,
    refuse_connect: HashSet<RadioAddress>,
    fail_next_socket: bool,
    fail_init: bool,
    closed: Vec<RadioSocket>,
}

impl SimState {
    fn link_of(&self, socket: RadioSocket) -> Result<&SimSocket, RadioError> {
        self.sockets.get(&socket).ok_or(RadioError::BadSocket(socket))
    }
}

// ============================================================================
// SIMULATED RADIO
// ============================================================================

/// Simulated radio transceiver
///
/// Clones share the same air, so a test can keep one handle to inject frames and
/// device traffic while the gateway owns another.
#[derive(Debug, Clone)]
pub struct SimulatedRadio {
    inner: Rc<RefCell<SimState>>,
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self::with_max_sockets(SIM_MAX_SOCKETS)
    }

    pub fn with_max_sockets(max_sockets: usize) -> Self {
        let state = SimState {
            max_sockets,
            next_socket: 1,
            ..Default::default()
        };
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    /// Configuration the radio was initialized with
    pub fn config(&self) -> Option<RadioConfig> {
        self.inner.borrow().config.clone()
    }

    /// Queue a management frame for the gateway to read
    pub fn push_frame(&self, frame: &Frame) {
        self.push_raw(frame.encode());
    }

    /// Queue raw management bytes, delivered as a single read
    pub fn push_raw(&self, bytes: Vec<u8>) {
        self.inner.borrow_mut().mgmt_queue.push_back(bytes);
    }

    /// Number of management frames not yet read
    pub fn pending_frames(&self) -> usize {
        self.inner.borrow().mgmt_queue.len()
    }

    /// Data sent by the device at `address` towards the gateway
    pub fn send_from_device(&self, address: RadioAddress, data: &[u8]) {
        self.inner
            .borrow_mut()
            .device_rx
            .entry(address)
            .or_default()
            .push_back(data.to_vec());
    }

    /// Everything the gateway wrote to the device at `address`
    pub fn received_by_device(&self, address: &RadioAddress) -> Vec<Vec<u8>> {
        self.inner
            .borrow()
            .device_tx
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every later read or write on the link to `address` fail
    pub fn drop_link(&self, address: RadioAddress) {
        self.inner.borrow_mut().dropped_links.insert(address);
    }

    /// Make connect requests towards `address` fail
    pub fn refuse_connect(&self, address: RadioAddress) {
        self.inner.borrow_mut().refuse_connect.insert(address);
    }

    /// Make the next socket allocation fail
    pub fn fail_next_socket(&self) {
        self.inner.borrow_mut().fail_next_socket = true;
    }

    /// Make the next init fail
    pub fn fail_init(&self) {
        self.inner.borrow_mut().fail_init = true;
    }

    /// Addresses the gateway asked to connect to, in order
    pub fn connect_requests(&self) -> Vec<RadioAddress> {
        self.inner.borrow().connect_requests.clone()
    }

    /// Number of times `socket` was closed
    pub fn close_count(&self, socket: RadioSocket) -> usize {
        self.inner.borrow().closed.iter().filter(|s| **s == socket).count()
    }

    /// Number of sockets currently open
    pub fn open_sockets(&self) -> usize {
        self.inner.borrow().sockets.len()
    }

    /// Data socket currently connected to `address`
    pub fn socket_for(&self, address: &RadioAddress) -> Option<RadioSocket> {
        self.inner
            .borrow()
            .sockets
            .iter()
            .find(|(_, s)| s.peer.as_ref() == Some(address))
            .map(|(id, _)| *id)
    }
}

impl Radio for SimulatedRadio {
    fn init(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        let mut st = self.inner.borrow_mut();
        if st.state.is_running() {
            return Err(RadioError::AlreadyInitialized);
        }
        if std::mem::take(&mut st.fail_init) {
            st.state = RadioState::Error("init failed".to_string());
            return Err(RadioError::HardwareUnavailable);
        }
        config.validate()?;

        st.config = Some(config.clone());
        st.state = RadioState::Running;
        Ok(())
    }

    fn deinit(&mut self) {
        let mut st = self.inner.borrow_mut();
        let open: Vec<RadioSocket> = st.sockets.keys().copied().collect();
        st.closed.extend(open);
        st.sockets.clear();
        st.state = RadioState::Stopped;
    }

    fn socket(&mut self, protocol: RadioProtocol) -> Result<RadioSocket, RadioError> {
        let mut st = self.inner.borrow_mut();
        if !st.state.is_running() {
            return Err(RadioError::NotInitialized);
        }
        if std::mem::take(&mut st.fail_next_socket) || st.sockets.len() >= st.max_sockets {
            return Err(RadioError::SocketLimit);
        }

        let id = RadioSocket::from_raw(st.next_socket);
        st.next_socket += 1;
        st.sockets.insert(id, SimSocket { protocol, peer: None });
        Ok(id)
    }

    fn read(&mut self, socket: RadioSocket, buf: &mut [u8]) -> Result<usize, RadioError> {
        let mut st = self.inner.borrow_mut();
        let (protocol, peer) = {
            let link = st.link_of(socket)?;
            (link.protocol, link.peer)
        };

        let chunk = match protocol {
            RadioProtocol::Mgmt => st.mgmt_queue.pop_front(),
            RadioProtocol::Raw => {
                let peer = peer.ok_or(RadioError::NotConnected)?;
                if st.dropped_links.contains(&peer) {
                    return Err(RadioError::Disconnected);
                }
                st.device_rx.get_mut(&peer).and_then(|q| q.pop_front())
            }
        };

        match chunk {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => Err(RadioError::WouldBlock),
        }
    }

    fn write(&mut self, socket: RadioSocket, data: &[u8]) -> Result<usize, RadioError> {
        let mut st = self.inner.borrow_mut();
        let (protocol, peer) = {
            let link = st.link_of(socket)?;
            (link.protocol, link.peer)
        };

        if protocol == RadioProtocol::Mgmt {
            return Ok(data.len());
        }

        let peer = peer.ok_or(RadioError::NotConnected)?;
        if st.dropped_links.contains(&peer) {
            return Err(RadioError::Disconnected);
        }
        st.device_tx.entry(peer).or_default().push(data.to_vec());
        Ok(data.len())
    }

    fn connect(&mut self, socket: RadioSocket, peer: &RadioAddress) -> Result<(), RadioError> {
        let mut st = self.inner.borrow_mut();
        st.link_of(socket)?;
        st.connect_requests.push(*peer);

        if st.refuse_connect.contains(peer) {
            return Err(RadioError::ConnectFailed(format!("{} did not answer", peer)));
        }

        // link_of succeeded above
        if let Some(link) = st.sockets.get_mut(&socket) {
            link.peer = Some(*peer);
        }
        Ok(())
    }

    fn close(&mut self, socket: RadioSocket) {
        let mut st = self.inner.borrow_mut();
        st.sockets.remove(&socket);
        st.closed.push(socket);
    }

    fn state(&self) -> RadioState {
        self.inner.borrow().state.clone()
    }
}
