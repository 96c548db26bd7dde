// Gateway Event Loop - Single-threaded reactor for the radio gateway
//
// One task owns everything: the management socket, beacons, peers and every
// session bridge. Each pass reads at most one management frame, dispatches it,
// polls pending upstream connects once, then services all bridges once.

use super::admin::{AdminCommand, GatewayHandle, GatewayStatus, PeerSummary, ADMIN_CHANNEL_CAPACITY};
use super::context::{AdapterContext, GatewaySettings};
use crate::admission::{Admission, AdmissionController, AdmissionError};
use crate::beacon::{BeaconTracker, UNKNOWN_NAME};
use crate::config::ConfigError;
use crate::peer::{PeerRegistry, PeerState, RegistryError};
use crate::radio::{Radio, RadioConfig, RadioError, RadioProtocol, RadioSocket};
use crate::session::{CloseReason, SessionBridge, SourceId, SourceTable};
use crate::storage::{PairingStore, StoreError};
use crate::upstream::{Connector, UpstreamError};
use crate::wire::{decode, Frame, RadioAddress, MGMT_BUFFER_SIZE};
use std::collections::HashMap;
use std::future::{poll_fn, Future};
use std::ops::ControlFlow;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Poll;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

// ============================================================================
// ERRORS
// ============================================================================

/// Gateway errors
///
/// Only the startup variants are fatal; everything else is reported and the
/// loop keeps going.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Radio init failed: {0}")]
    RadioInit(RadioError),

    #[error("Cannot open management socket: {0}")]
    MgmtSocket(RadioError),

    #[error("Gateway not started")]
    NotStarted,

    #[error("Gateway already started")]
    AlreadyStarted,

    #[error("Gateway stopped")]
    Stopped,

    #[error("Pairing store: {0}")]
    Store(#[from] StoreError),

    #[error("Config: {0}")]
    Config(#[from] ConfigError),

    #[error("Upstream: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Registry: {0}")]
    Registry(#[from] RegistryError),
}

// ============================================================================
// PENDING CONNECTS
// ============================================================================

type ConnectFuture<L> = Pin<Box<dyn Future<Output = Result<L, UpstreamError>>>>;

/// Upstream connect in flight for a paging peer
///
/// Holds the peer's radio data socket until the link is up.
struct PendingConnect<L> {
    socket: RadioSocket,
    link: ConnectFuture<L>,
}

// ============================================================================
// GATEWAY
// ============================================================================

/// The gateway: radio management channel, peers and their bridges
pub struct Gateway<R: Radio, C: Connector> {
    radio: R,
    radio_config: RadioConfig,
    connector: Rc<C>,
    settings: GatewaySettings,
    context: AdapterContext,
    mgmt_socket: Option<RadioSocket>,
    beacons: BeaconTracker,
    registry: PeerRegistry,
    admission: AdmissionController,
    bridges: SourceTable<SessionBridge<C::Link>>,
    bridge_index: HashMap<RadioAddress, SourceId>,
    connecting: HashMap<RadioAddress, PendingConnect<C::Link>>,
    store: Option<Box<dyn PairingStore>>,
    command_tx: mpsc::Sender<AdminCommand>,
    command_rx: mpsc::Receiver<AdminCommand>,
    epoch: Instant,
}

impl<R: Radio, C: Connector + 'static> Gateway<R, C> {
    pub fn new(radio: R, radio_config: RadioConfig, connector: C, settings: GatewaySettings) -> Self {
        let (command_tx, command_rx) = mpsc::channel(ADMIN_CHANNEL_CAPACITY);
        Self {
            context: AdapterContext::new(&radio_config, settings.max_peers),
            admission: AdmissionController::new(settings.max_peers),
            radio,
            radio_config,
            connector: Rc::new(connector),
            settings,
            mgmt_socket: None,
            beacons: BeaconTracker::new(),
            registry: PeerRegistry::new(),
            bridges: SourceTable::new(),
            bridge_index: HashMap::new(),
            connecting: HashMap::new(),
            store: None,
            command_tx,
            command_rx,
            epoch: Instant::now(),
        }
    }

    /// Persist pairings here and load them at start
    pub fn with_pairing_store(mut self, store: Box<dyn PairingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Handle for other tasks
    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle::new(self.command_tx.clone())
    }

    pub fn context(&self) -> &AdapterContext {
        &self.context
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn beacons(&self) -> &BeaconTracker {
        &self.beacons
    }

    /// Number of live bridges
    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    /// Check if a bridge is registered for `address`
    pub fn has_bridge(&self, address: &RadioAddress) -> bool {
        self.bridge_index.contains_key(address)
    }

    /// Number of upstream connects still in flight
    pub fn pending_connects(&self) -> usize {
        self.connecting.len()
    }

    /// Milliseconds since the gateway was created
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Bring the radio up, open the management socket and load pairings
    pub fn start(&mut self) -> Result<(), GatewayError> {
        if self.mgmt_socket.is_some() {
            return Err(GatewayError::AlreadyStarted);
        }

        self.radio
            .init(&self.radio_config)
            .map_err(GatewayError::RadioInit)?;

        let socket = match self.radio.socket(RadioProtocol::Mgmt) {
            Ok(socket) => socket,
            Err(e) => {
                self.radio.deinit();
                return Err(GatewayError::MgmtSocket(e));
            }
        };
        self.mgmt_socket = Some(socket);
        self.context.powered = true;

        if let Some(store) = self.store.take() {
            let loaded = self.load_pairings(store.as_ref());
            self.store = Some(store);
            let loaded = loaded?;
            info!(count = loaded, "loaded pairings");
        }

        info!(
            address = %self.context.address,
            channel = self.context.channel,
            power = self.context.power.dbm(),
            upstream = %self.connector.describe(),
            "radio up"
        );
        Ok(())
    }

    /// Register every stored pairing as a known offline peer
    pub fn load_pairings(&mut self, store: &dyn PairingStore) -> Result<usize, GatewayError> {
        let registry = &mut self.registry;
        let mut loaded = 0;
        store.for_each(&mut |address, alias| {
            if registry.register_known(*address, alias, true) {
                loaded += 1;
            }
        })?;
        Ok(loaded)
    }

    /// Tear down every bridge, close the management socket and power off
    pub fn shutdown(&mut self) {
        if !self.context.powered {
            return;
        }

        for (_, pending) in self.connecting.drain() {
            self.radio.close(pending.socket);
        }
        for id in self.bridges.ids() {
            self.close_bridge(id, CloseReason::Shutdown);
        }
        self.bridges.reclaim();

        if let Some(socket) = self.mgmt_socket.take() {
            self.radio.close(socket);
        }
        self.beacons.clear();
        self.registry.clear();
        self.bridge_index.clear();
        self.radio.deinit();
        self.context.powered = false;
        info!("radio down");
    }

    /// Run until shutdown is requested through a [`GatewayHandle`]
    pub async fn run(&mut self) -> Result<(), GatewayError> {
        if self.mgmt_socket.is_none() {
            self.start()?;
        }

        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = tokio::time::interval(self.settings.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.poll_once().await?;
                }
                _ = sweep.tick() => {
                    let now = self.now_ms();
                    self.sweep(now);
                }
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if self.handle_command(command).is_break() {
                        info!("shutdown requested");
                        break;
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    // ========================================================================
    // EVENT LOOP
    // ========================================================================

    /// One pass: at most one management frame, pending connects, then every bridge once
    ///
    /// Never waits on a connect; one still in flight is polled again next pass.
    pub async fn poll_once(&mut self) -> Result<(), GatewayError> {
        let mgmt = self.mgmt_socket.ok_or(GatewayError::NotStarted)?;

        let mut buf = [0u8; MGMT_BUFFER_SIZE];
        match self.radio.read(mgmt, &mut buf) {
            Ok(n) => match decode(&buf[..n]) {
                Ok(frame) => self.handle_frame(frame),
                Err(e) => trace!(error = %e, "dropping management frame"),
            },
            Err(RadioError::WouldBlock) => {}
            Err(e) => warn!(error = %e, "management read failed"),
        }

        self.finish_connects().await;
        self.service_bridges();
        Ok(())
    }

    /// Forget beacons older than the broadcast timeout
    pub fn sweep(&mut self, now: u64) -> Vec<RadioAddress> {
        let expired = self
            .beacons
            .expire_older_than(now, self.settings.beacon_timeout_ms);
        for address in &expired {
            debug!(address = %address, "beacon expired");
        }
        expired
    }

    /// Route a decoded management frame
    pub fn handle_frame(&mut self, frame: Frame) {
        let opcode = frame.opcode();
        match frame {
            Frame::Presence { address, name } => self.on_presence(address, &name),
            Frame::Connected { peer, local } => self.on_connected(peer, local),
            Frame::Disconnected { address } => self.on_disconnected(address),
            Frame::SetupBroadcast | Frame::Broadcast => {
                trace!(opcode, "ignoring broadcast");
            }
        }
    }

    fn on_presence(&mut self, address: RadioAddress, raw_name: &[u8]) {
        let now = self.now_ms();
        self.beacons.observe(address, raw_name, now);
        let alias = self
            .beacons
            .get(&address)
            .map(|b| b.name().to_string())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());

        match self.admission.admit(&mut self.registry, address, &alias) {
            Ok(Admission::Proceed) => self.open_session(address),
            Ok(admission) => trace!(address = %address, ?admission, "presence handled"),
            Err(AdmissionError::CapacityExceeded { .. }) | Err(AdmissionError::IdentityConflict(_)) => {}
            Err(e) => warn!(address = %address, error = %e, "admission failed"),
        }
    }

    /// Open the radio socket, mark the peer paging and start the upstream connect
    ///
    /// The bridge is registered and the device paged once the upstream link is
    /// up. Anything opened is released again if a later step fails and the peer
    /// goes back offline.
    fn open_session(&mut self, address: RadioAddress) {
        let socket = match self.radio.socket(RadioProtocol::Raw) {
            Ok(socket) => socket,
            Err(e) => {
                warn!(address = %address, error = %e, "no radio socket for peer");
                return;
            }
        };

        if let Err(e) = self.registry.mark_paging(&address) {
            warn!(address = %address, error = %e, "cannot page peer");
            self.radio.close(socket);
            return;
        }
        self.beacons.consume(&address);

        let connector = Rc::clone(&self.connector);
        let link: ConnectFuture<C::Link> = Box::pin(async move { connector.connect().await });
        self.connecting.insert(address, PendingConnect { socket, link });
        debug!(address = %address, upstream = %self.connector.describe(), "connecting upstream");
    }

    /// Poll every pending upstream connect once and act on the finished ones
    async fn finish_connects(&mut self) {
        if self.connecting.is_empty() {
            return;
        }

        let connecting = &mut self.connecting;
        let finished: Vec<(RadioAddress, RadioSocket, Result<C::Link, UpstreamError>)> =
            poll_fn(|cx| {
                let mut finished = Vec::new();
                connecting.retain(|address, pending| match pending.link.as_mut().poll(cx) {
                    Poll::Ready(result) => {
                        finished.push((*address, pending.socket, result));
                        false
                    }
                    Poll::Pending => true,
                });
                Poll::Ready(finished)
            })
            .await;

        for (address, socket, result) in finished {
            match result {
                Ok(link) => self.attach_session(address, socket, link),
                Err(e) => {
                    warn!(address = %address, error = %e, "upstream connect failed");
                    self.abort_paging(address, socket);
                }
            }
        }
    }

    /// Register the bridge for a freshly connected upstream link and page the device
    fn attach_session(&mut self, address: RadioAddress, socket: RadioSocket, link: C::Link) {
        let id = self.bridges.insert(SessionBridge::new(address, socket, link));
        self.bridge_index.insert(address, id);

        if let Err(e) = self.radio.connect(socket, &address) {
            warn!(address = %address, error = %e, "radio connect failed");
            self.close_bridge(id, CloseReason::ConnectFailed(e.to_string()));
            return;
        }
        info!(address = %address, socket = %socket, "paging peer");
    }

    /// Drop a pending connect, releasing its radio socket
    ///
    /// Returns `false` if no connect was in flight for `address`.
    fn cancel_connect(&mut self, address: &RadioAddress) -> bool {
        match self.connecting.remove(address) {
            Some(pending) => {
                self.abort_paging(*address, pending.socket);
                true
            }
            None => false,
        }
    }

    fn abort_paging(&mut self, address: RadioAddress, socket: RadioSocket) {
        self.radio.close(socket);
        match self.registry.mark_offline(&address) {
            Ok(_) => info!(address = %address, "peer offline"),
            Err(e) => warn!(address = %address, error = %e, "cannot mark peer offline"),
        }
    }

    fn on_connected(&mut self, peer: RadioAddress, local: RadioAddress) {
        debug!(address = %peer, local = %local, "link connected");
        self.promote(peer);
    }

    fn on_disconnected(&mut self, address: RadioAddress) {
        if let Some(id) = self.bridge_index.get(&address).copied() {
            self.close_bridge(id, CloseReason::Disconnected);
        } else if !self.cancel_connect(&address) {
            debug!(address = %address, "disconnect for peer without session");
        }
    }

    /// Paging -> Online once the link is confirmed
    fn promote(&mut self, address: RadioAddress) {
        if self.registry.state_of(&address) != Some(PeerState::Paging) {
            return;
        }
        let Some(id) = self.bridge_index.get(&address).copied() else {
            return;
        };
        let Some(socket) = self.bridges.get(id).and_then(|b| b.radio_socket()) else {
            return;
        };

        match self.registry.mark_online(&address, socket, id) {
            Ok(()) => info!(address = %address, "peer online"),
            Err(e) => warn!(address = %address, error = %e, "cannot mark peer online"),
        }
    }

    fn service_bridges(&mut self) {
        for id in self.bridges.ids() {
            let Some(bridge) = self.bridges.get_mut(id) else {
                continue;
            };
            let outcome = bridge.service(&mut self.radio);
            let address = *bridge.address();

            if outcome.radio_bytes > 0 {
                self.promote(address);
            }
            if let Some(reason) = outcome.closed {
                self.close_bridge(id, reason);
            }
        }
        self.bridges.reclaim();
    }

    /// Tear a bridge down and return its peer to offline
    fn close_bridge(&mut self, id: SourceId, reason: CloseReason) {
        let Some(mut bridge) = self.bridges.remove(id) else {
            return;
        };
        let address = *bridge.address();
        bridge.teardown(&mut self.radio, &reason);
        if self.bridge_index.get(&address) == Some(&id) {
            self.bridge_index.remove(&address);
        }

        match self.registry.mark_offline(&address) {
            Ok(previous) => info!(address = %address, from = %previous, reason = %reason, "peer offline"),
            Err(e) => warn!(address = %address, error = %e, "cannot mark peer offline"),
        }
    }

    // ========================================================================
    // ADMIN
    // ========================================================================

    /// Serve one admin command; `Break` asks the run loop to stop
    fn handle_command(&mut self, command: AdminCommand) -> ControlFlow<()> {
        match command {
            AdminCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            AdminCommand::Pair { address, alias, reply } => {
                let _ = reply.send(self.pair(address, &alias));
            }
            AdminCommand::RemoveDevice { address, reply } => {
                let _ = reply.send(self.remove_device(address));
            }
            AdminCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Snapshot for the admin surface
    pub fn status(&self) -> GatewayStatus {
        let mut peers: Vec<PeerSummary> = self
            .registry
            .iter()
            .map(|p| PeerSummary {
                address: *p.address(),
                alias: p.alias().to_string(),
                state: p.state(),
                paired: p.is_paired(),
            })
            .collect();
        peers.sort_by_key(|p| p.address);

        GatewayStatus {
            adapter: self.context.clone(),
            stats: self.registry.stats(),
            peers,
            beacons: self.beacons.entries(),
            bridges: self.bridges.len(),
        }
    }

    /// Mark `address` as paired, registering it if unknown
    pub fn pair(&mut self, address: RadioAddress, alias: &str) -> Result<(), GatewayError> {
        if let Some(store) = &self.store {
            store.save(&address, alias)?;
        }
        if !self.registry.register_known(address, alias, true) {
            self.registry.set_paired(&address, true)?;
        }
        info!(address = %address, alias, "device paired");
        Ok(())
    }

    /// Drop any session for `address`, forget it and delete its pairing
    ///
    /// Returns whether the device was known.
    pub fn remove_device(&mut self, address: RadioAddress) -> Result<bool, GatewayError> {
        if let Some(id) = self.bridge_index.get(&address).copied() {
            self.close_bridge(id, CloseReason::Unpaired);
            self.bridges.reclaim();
        }
        self.cancel_connect(&address);
        self.beacons.consume(&address);

        let known = match self.registry.unregister(&address) {
            Ok(_) => true,
            Err(RegistryError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };
        let stored = match &self.store {
            Some(store) => store.remove(&address)?,
            None => false,
        };

        if known || stored {
            info!(address = %address, "device removed");
        }
        Ok(known || stored)
    }
}
