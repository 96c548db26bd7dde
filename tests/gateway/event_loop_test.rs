// Gateway Event Loop Tests
// End-to-end tests driving the gateway through the simulated radio and a local TCP upstream

use nrfgate::gateway::{Gateway, GatewayError, GatewaySettings};
use nrfgate::peer::PeerState;
use nrfgate::radio::{Radio, RadioConfig, RadioError, RadioState, SimulatedRadio};
use nrfgate::storage::{PairingDb, PairingStore};
use nrfgate::upstream::{Connector, UpstreamConnector, UpstreamError, UpstreamStream, UpstreamTarget};
use nrfgate::wire::{Frame, RadioAddress};
use std::cell::Cell;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

type TestGateway = Gateway<SimulatedRadio, UpstreamConnector>;

const LOCAL: RadioAddress = RadioAddress::from_bytes([0xCA, 0xFE, 0, 0, 0, 0, 0, 1]);

fn dev(n: u8) -> RadioAddress {
    RadioAddress::from_bytes([0xD0, 0, 0, 0, 0, 0, 0, n])
}

fn presence(address: RadioAddress, name: &str) -> Frame {
    Frame::Presence {
        address,
        name: name.as_bytes().to_vec(),
    }
}

// ============================================================================
// HARNESS
// ============================================================================

struct Harness {
    gateway: TestGateway,
    air: SimulatedRadio,
    listener: TcpListener,
}

async fn connector_for(listener: &TcpListener) -> UpstreamConnector {
    let port = listener.local_addr().unwrap().port();
    UpstreamConnector::resolve(UpstreamTarget::tcp("127.0.0.1", port))
        .await
        .unwrap()
}

async fn harness_with(settings: GatewaySettings) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let connector = connector_for(&listener).await;
    let radio = SimulatedRadio::new();
    let air = radio.clone();

    let mut gateway = Gateway::new(radio, RadioConfig::new().with_address(LOCAL), connector, settings);
    gateway.start().unwrap();
    Harness {
        gateway,
        air,
        listener,
    }
}

async fn harness() -> Harness {
    harness_with(GatewaySettings::new()).await
}

/// Run passes until `done` holds, yielding to the runtime in between
async fn pump_until<C: Connector + 'static>(
    gateway: &mut Gateway<SimulatedRadio, C>,
    done: impl Fn(&Gateway<SimulatedRadio, C>) -> bool,
) -> bool {
    for _ in 0..200 {
        if done(gateway) {
            return true;
        }
        gateway.poll_once().await.unwrap();
        sleep(Duration::from_millis(5)).await;
    }
    done(gateway)
}

async fn pump<C: Connector + 'static>(gateway: &mut Gateway<SimulatedRadio, C>, rounds: usize) {
    for _ in 0..rounds {
        gateway.poll_once().await.unwrap();
        sleep(Duration::from_millis(5)).await;
    }
}

async fn accept(listener: &TcpListener) -> TcpStream {
    timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("no upstream connection")
        .unwrap()
        .0
}

async fn no_connection(listener: &TcpListener) -> bool {
    timeout(Duration::from_millis(50), listener.accept()).await.is_err()
}

/// Pair `address`, page it and confirm the link; returns the upstream side
async fn bring_online(h: &mut Harness, address: RadioAddress) -> TcpStream {
    h.gateway.pair(address, "dev").unwrap();
    h.air.push_frame(&presence(address, "dev"));
    h.gateway.poll_once().await.unwrap();
    let upstream = accept(&h.listener).await;
    assert!(pump_until(&mut h.gateway, |g| g.has_bridge(&address)).await);

    h.air.push_frame(&Frame::Connected {
        peer: address,
        local: LOCAL,
    });
    assert!(
        pump_until(&mut h.gateway, |g| g.registry().state_of(&address) == Some(PeerState::Online))
            .await
    );
    upstream
}

/// Upstream connector that takes `delay` for every connect after the first `fast` ones
struct SlowConnector {
    inner: UpstreamConnector,
    delay: Duration,
    fast: usize,
    calls: Cell<usize>,
}

impl Connector for SlowConnector {
    type Link = UpstreamStream;

    async fn connect(&self) -> Result<UpstreamStream, UpstreamError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call >= self.fast {
            sleep(self.delay).await;
        }
        self.inner.connect().await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

async fn slow_gateway(
    listener: &TcpListener,
    fast: usize,
) -> (Gateway<SimulatedRadio, SlowConnector>, SimulatedRadio) {
    let connector = SlowConnector {
        inner: connector_for(listener).await,
        delay: Duration::from_millis(500),
        fast,
        calls: Cell::new(0),
    };
    let radio = SimulatedRadio::new();
    let air = radio.clone();
    let mut gateway = Gateway::new(radio, RadioConfig::new().with_address(LOCAL), connector, GatewaySettings::new());
    gateway.start().unwrap();
    (gateway, air)
}

// ============================================================================
// STARTUP
// ============================================================================

#[tokio::test]
async fn test_start_powers_adapter() {
    let h = harness().await;

    assert!(h.gateway.context().powered);
    assert_eq!(h.gateway.context().address, LOCAL);
    assert_eq!(h.air.state(), RadioState::Running);
    assert_eq!(h.air.open_sockets(), 1);
}

#[tokio::test]
async fn test_start_twice_rejected() {
    let mut h = harness().await;
    assert!(matches!(h.gateway.start(), Err(GatewayError::AlreadyStarted)));
}

#[tokio::test]
async fn test_radio_init_failure_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let radio = SimulatedRadio::new();
    radio.fail_init();

    let mut gateway = Gateway::new(
        radio,
        RadioConfig::new().with_address(LOCAL),
        connector_for(&listener).await,
        GatewaySettings::new(),
    );
    assert!(matches!(
        gateway.start(),
        Err(GatewayError::RadioInit(RadioError::HardwareUnavailable))
    ));
    assert!(matches!(gateway.poll_once().await, Err(GatewayError::NotStarted)));
}

#[tokio::test]
async fn test_mgmt_socket_failure_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let radio = SimulatedRadio::with_max_sockets(0);
    let air = radio.clone();

    let mut gateway = Gateway::new(
        radio,
        RadioConfig::new().with_address(LOCAL),
        connector_for(&listener).await,
        GatewaySettings::new(),
    );
    assert!(matches!(
        gateway.start(),
        Err(GatewayError::MgmtSocket(RadioError::SocketLimit))
    ));
    assert_eq!(air.state(), RadioState::Stopped);
    assert!(!gateway.context().powered);
}

#[tokio::test]
async fn test_pairings_loaded_at_start() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let store = PairingDb::temporary().unwrap();
    store.save(&dev(1), "kitchen").unwrap();
    store.save(&dev(2), "hall").unwrap();

    let mut gateway = Gateway::new(
        SimulatedRadio::new(),
        RadioConfig::new().with_address(LOCAL),
        connector_for(&listener).await,
        GatewaySettings::new(),
    )
    .with_pairing_store(Box::new(store));
    gateway.start().unwrap();

    let peer = gateway.registry().lookup(&dev(1)).unwrap();
    assert_eq!(peer.alias(), "kitchen");
    assert!(peer.is_paired());
    assert_eq!(peer.state(), PeerState::Offline);
    assert_eq!(gateway.registry().len(), 2);
}

// ============================================================================
// PRESENCE
// ============================================================================

#[tokio::test]
async fn test_unpaired_device_is_only_registered() {
    let mut h = harness().await;
    h.air.push_frame(&presence(dev(1), "thermo"));
    h.gateway.poll_once().await.unwrap();

    let peer = h.gateway.registry().lookup(&dev(1)).unwrap();
    assert_eq!(peer.state(), PeerState::Offline);
    assert!(!peer.is_paired());
    assert_eq!(peer.alias(), "thermo");
    assert!(h.gateway.beacons().contains(&dev(1)));
    assert!(h.air.connect_requests().is_empty());
    assert_eq!(h.gateway.bridge_count(), 0);
    assert!(no_connection(&h.listener).await);
}

#[tokio::test]
async fn test_repeated_presence_one_beacon() {
    let mut h = harness().await;
    h.air.push_frame(&presence(dev(1), "thermo"));
    h.gateway.poll_once().await.unwrap();
    let first = h.gateway.beacons().get(&dev(1)).unwrap().last_seen();

    sleep(Duration::from_millis(20)).await;
    h.air.push_frame(&presence(dev(1), "thermo"));
    h.gateway.poll_once().await.unwrap();

    assert_eq!(h.gateway.beacons().len(), 1);
    assert!(h.gateway.beacons().get(&dev(1)).unwrap().last_seen() > first);
    assert_eq!(h.gateway.registry().len(), 1);
}

#[tokio::test]
async fn test_nameless_presence_uses_placeholder() {
    let mut h = harness().await;
    h.air.push_frame(&Frame::Presence {
        address: dev(1),
        name: vec![0xFF, 0x00],
    });
    h.gateway.poll_once().await.unwrap();

    assert_eq!(h.gateway.beacons().get(&dev(1)).unwrap().name(), "unknown");
    assert_eq!(h.gateway.registry().lookup(&dev(1)).unwrap().alias(), "unknown");
}

#[tokio::test]
async fn test_paired_device_is_paged() {
    let mut h = harness().await;
    h.gateway.pair(dev(1), "lamp").unwrap();

    h.air.push_frame(&presence(dev(1), "lamp"));
    h.gateway.poll_once().await.unwrap();

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Paging));
    assert!(!h.gateway.beacons().contains(&dev(1)));

    accept(&h.listener).await;
    assert!(pump_until(&mut h.gateway, |g| g.has_bridge(&dev(1))).await);
    assert_eq!(h.gateway.pending_connects(), 0);
    assert_eq!(h.air.connect_requests(), vec![dev(1)]);
    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Paging));
}

#[tokio::test]
async fn test_presence_while_paging_is_ignored() {
    let mut h = harness().await;
    h.gateway.pair(dev(1), "lamp").unwrap();
    h.air.push_frame(&presence(dev(1), "lamp"));
    h.air.push_frame(&presence(dev(1), "lamp"));
    assert!(pump_until(&mut h.gateway, |g| g.has_bridge(&dev(1))).await);
    pump(&mut h.gateway, 2).await;

    assert_eq!(h.air.connect_requests().len(), 1);
    assert_eq!(h.gateway.bridge_count(), 1);
    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Paging));
}

#[tokio::test]
async fn test_max_peers_plus_one() {
    let mut h = harness().await;
    for n in 0..6 {
        h.gateway.pair(dev(n), "dev").unwrap();
    }
    for n in 0..6 {
        h.air.push_frame(&presence(dev(n), "dev"));
    }
    pump(&mut h.gateway, 6).await;
    assert!(pump_until(&mut h.gateway, |g| g.bridge_count() == 5).await);

    let registry = h.gateway.registry();
    assert_eq!(registry.count(PeerState::Paging), 5);
    assert_eq!(registry.state_of(&dev(5)), Some(PeerState::Offline));
    assert_eq!(h.air.connect_requests().len(), 5);
    assert_eq!(h.gateway.bridge_count(), 5);
    // the refused device keeps its beacon
    assert!(h.gateway.beacons().contains(&dev(5)));
}

#[tokio::test]
async fn test_presence_from_online_address_is_conflict() {
    let mut h = harness().await;
    let _upstream = bring_online(&mut h, dev(1)).await;
    let socket = h.air.socket_for(&dev(1)).unwrap();

    h.air.push_frame(&presence(dev(1), "clone"));
    pump(&mut h.gateway, 2).await;

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Online));
    assert_eq!(h.air.connect_requests().len(), 1);
    assert_eq!(h.gateway.bridge_count(), 1);
    assert_eq!(h.air.close_count(socket), 0);
}

// ============================================================================
// FAILED ATTEMPTS
// ============================================================================

#[tokio::test]
async fn test_upstream_unreachable_leaves_peer_offline() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let connector = connector_for(&listener).await;
    drop(listener);

    let radio = SimulatedRadio::new();
    let air = radio.clone();
    let mut gateway = Gateway::new(radio, RadioConfig::new().with_address(LOCAL), connector, GatewaySettings::new());
    gateway.start().unwrap();
    gateway.pair(dev(1), "lamp").unwrap();

    air.push_frame(&presence(dev(1), "lamp"));
    gateway.poll_once().await.unwrap();
    assert!(pump_until(&mut gateway, |g| g.pending_connects() == 0).await);

    assert_eq!(gateway.registry().state_of(&dev(1)), Some(PeerState::Offline));
    assert_eq!(gateway.bridge_count(), 0);
    assert_eq!(air.open_sockets(), 1);
    assert!(air.connect_requests().is_empty());
}

#[tokio::test]
async fn test_no_radio_socket_leaves_peer_offline() {
    let mut h = harness().await;
    h.gateway.pair(dev(1), "lamp").unwrap();
    h.air.fail_next_socket();

    h.air.push_frame(&presence(dev(1), "lamp"));
    h.gateway.poll_once().await.unwrap();

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Offline));
    assert!(no_connection(&h.listener).await);
}

#[tokio::test]
async fn test_radio_connect_failure_releases_everything() {
    let mut h = harness().await;
    h.gateway.pair(dev(1), "lamp").unwrap();
    h.air.refuse_connect(dev(1));

    h.air.push_frame(&presence(dev(1), "lamp"));
    h.gateway.poll_once().await.unwrap();
    let air = h.air.clone();
    assert!(pump_until(&mut h.gateway, |_| !air.connect_requests().is_empty()).await);

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Offline));
    assert_eq!(h.gateway.bridge_count(), 0);
    assert_eq!(h.air.open_sockets(), 1);

    let mut upstream = accept(&h.listener).await;
    let mut buf = [0u8; 8];
    let n = timeout(Duration::from_secs(2), upstream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_slow_upstream_connect_does_not_stall_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut gateway, air) = slow_gateway(&listener, 1).await;
    gateway.pair(dev(1), "fast").unwrap();
    gateway.pair(dev(2), "slow").unwrap();

    air.push_frame(&presence(dev(1), "fast"));
    gateway.poll_once().await.unwrap();
    let mut upstream = accept(&listener).await;
    assert!(pump_until(&mut gateway, |g| g.has_bridge(&dev(1))).await);

    air.push_frame(&presence(dev(2), "slow"));
    let started = Instant::now();
    gateway.poll_once().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(gateway.registry().state_of(&dev(2)), Some(PeerState::Paging));
    assert_eq!(gateway.pending_connects(), 1);

    // the established bridge keeps relaying meanwhile
    air.send_from_device(dev(1), b"ping");
    let started = Instant::now();
    gateway.poll_once().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    let mut buf = [0u8; 8];
    let n = timeout(Duration::from_secs(2), upstream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"ping");
    assert_eq!(gateway.pending_connects(), 1);
    assert!(!gateway.has_bridge(&dev(2)));

    assert!(pump_until(&mut gateway, |g| g.has_bridge(&dev(2))).await);
    assert_eq!(air.connect_requests(), vec![dev(1), dev(2)]);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut gateway, air) = slow_gateway(&listener, 0).await;
    gateway.pair(dev(1), "lamp").unwrap();

    air.push_frame(&presence(dev(1), "lamp"));
    gateway.poll_once().await.unwrap();
    assert_eq!(gateway.pending_connects(), 1);
    assert_eq!(air.open_sockets(), 2);

    air.push_frame(&Frame::Disconnected { address: dev(1) });
    gateway.poll_once().await.unwrap();

    assert_eq!(gateway.registry().state_of(&dev(1)), Some(PeerState::Offline));
    assert_eq!(gateway.pending_connects(), 0);
    assert_eq!(air.open_sockets(), 1);

    sleep(Duration::from_millis(600)).await;
    pump(&mut gateway, 2).await;
    assert_eq!(gateway.bridge_count(), 0);
    assert!(air.connect_requests().is_empty());
}

#[tokio::test]
async fn test_remove_device_while_connecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut gateway, air) = slow_gateway(&listener, 0).await;
    gateway.pair(dev(1), "lamp").unwrap();

    air.push_frame(&presence(dev(1), "lamp"));
    gateway.poll_once().await.unwrap();
    assert_eq!(gateway.pending_connects(), 1);

    assert!(gateway.remove_device(dev(1)).unwrap());
    assert!(gateway.registry().lookup(&dev(1)).is_none());
    assert_eq!(gateway.pending_connects(), 0);
    assert_eq!(air.open_sockets(), 1);
}

// ============================================================================
// RELAY AND TEARDOWN
// ============================================================================

#[tokio::test]
async fn test_end_to_end_relay() {
    let mut h = harness().await;
    let mut upstream = bring_online(&mut h, dev(1)).await;

    // device -> upstream
    h.air.send_from_device(dev(1), b"hello");
    pump(&mut h.gateway, 1).await;
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(2), upstream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"hello");

    // upstream -> device
    upstream.write_all(b"cmd:on").await.unwrap();
    let air = h.air.clone();
    assert!(pump_until(&mut h.gateway, |_| !air.received_by_device(&dev(1)).is_empty()).await);
    assert_eq!(h.air.received_by_device(&dev(1)).concat(), b"cmd:on".to_vec());
}

#[tokio::test]
async fn test_first_radio_data_promotes_paging_peer() {
    let mut h = harness().await;
    h.gateway.pair(dev(1), "lamp").unwrap();
    h.air.push_frame(&presence(dev(1), "lamp"));
    h.gateway.poll_once().await.unwrap();
    let _upstream = accept(&h.listener).await;
    assert!(pump_until(&mut h.gateway, |g| g.has_bridge(&dev(1))).await);
    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Paging));

    h.air.send_from_device(dev(1), b"up");
    h.gateway.poll_once().await.unwrap();

    let peer = h.gateway.registry().lookup(&dev(1)).unwrap();
    assert_eq!(peer.state(), PeerState::Online);
    assert_eq!(peer.radio_socket(), h.air.socket_for(&dev(1)));
}

#[tokio::test]
async fn test_disconnect_tears_down_once() {
    let mut h = harness().await;
    let mut upstream = bring_online(&mut h, dev(1)).await;
    let socket = h.air.socket_for(&dev(1)).unwrap();

    h.air.push_frame(&Frame::Disconnected { address: dev(1) });
    h.air.push_frame(&Frame::Disconnected { address: dev(1) });
    pump(&mut h.gateway, 2).await;

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Offline));
    assert!(h.gateway.registry().lookup(&dev(1)).unwrap().radio_socket().is_none());
    assert_eq!(h.gateway.bridge_count(), 0);
    assert_eq!(h.air.close_count(socket), 1);

    let mut buf = [0u8; 8];
    let n = timeout(Duration::from_secs(2), upstream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_disconnect_without_session_is_noop() {
    let mut h = harness().await;
    h.gateway.pair(dev(1), "lamp").unwrap();

    h.air.push_frame(&Frame::Disconnected { address: dev(1) });
    h.air.push_frame(&Frame::Disconnected { address: dev(9) });
    pump(&mut h.gateway, 2).await;

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Offline));
    assert!(h.gateway.registry().lookup(&dev(9)).is_none());
}

#[tokio::test]
async fn test_upstream_close_takes_peer_offline() {
    let mut h = harness().await;
    let upstream = bring_online(&mut h, dev(1)).await;
    let socket = h.air.socket_for(&dev(1)).unwrap();

    drop(upstream);
    assert!(
        pump_until(&mut h.gateway, |g| g.registry().state_of(&dev(1)) == Some(PeerState::Offline))
            .await
    );
    assert_eq!(h.air.close_count(socket), 1);
    assert_eq!(h.gateway.bridge_count(), 0);
}

#[tokio::test]
async fn test_radio_link_loss_takes_peer_offline() {
    let mut h = harness().await;
    let _upstream = bring_online(&mut h, dev(1)).await;

    h.air.drop_link(dev(1));
    h.gateway.poll_once().await.unwrap();

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Offline));
    assert!(!h.gateway.has_bridge(&dev(1)));
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let mut h = harness().await;
    let _first = bring_online(&mut h, dev(1)).await;
    h.air.push_frame(&Frame::Disconnected { address: dev(1) });
    pump(&mut h.gateway, 1).await;

    h.air.push_frame(&presence(dev(1), "dev"));
    h.gateway.poll_once().await.unwrap();
    let _second = accept(&h.listener).await;
    let air = h.air.clone();
    assert!(pump_until(&mut h.gateway, |_| air.connect_requests().len() == 2).await);

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Paging));
}

// ============================================================================
// MALFORMED FRAMES AND SWEEP
// ============================================================================

#[tokio::test]
async fn test_malformed_frames_dropped() {
    let mut h = harness().await;
    h.air.push_raw(vec![0x01]);
    h.air.push_raw(vec![0x01, 0x00, 0x00]);
    h.air.push_raw(vec![0x01, 0x02, 0x00]);
    h.air.push_raw(vec![0x99, 0x02]);
    pump(&mut h.gateway, 4).await;

    assert_eq!(h.air.pending_frames(), 0);
    assert!(h.gateway.registry().is_empty());
    assert!(h.gateway.beacons().is_empty());
}

#[tokio::test]
async fn test_sweep_expires_beacons() {
    let mut h = harness_with(GatewaySettings::new().with_beacon_timeout_ms(1_000)).await;
    h.air.push_frame(&presence(dev(1), "x"));
    h.gateway.poll_once().await.unwrap();
    let seen = h.gateway.beacons().get(&dev(1)).unwrap().last_seen();

    assert!(h.gateway.sweep(seen + 999).is_empty());
    assert!(h.gateway.sweep(seen + 1_000).is_empty());
    assert!(h.gateway.beacons().contains(&dev(1)));
    assert_eq!(h.gateway.sweep(seen + 1_001), vec![dev(1)]);
    assert!(h.gateway.beacons().is_empty());
    // the peer record outlives its beacon
    assert!(h.gateway.registry().lookup(&dev(1)).is_some());
}

// ============================================================================
// ADMIN AND SHUTDOWN
// ============================================================================

#[tokio::test]
async fn test_pair_persists_to_store() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let mut gateway = Gateway::new(
        SimulatedRadio::new(),
        RadioConfig::new().with_address(LOCAL),
        connector_for(&listener).await,
        GatewaySettings::new(),
    )
    .with_pairing_store(Box::new(PairingDb::open(dir.path()).unwrap()));
    gateway.start().unwrap();

    gateway.pair(dev(3), "porch").unwrap();
    assert!(gateway.registry().lookup(&dev(3)).unwrap().is_paired());
    assert!(gateway.remove_device(dev(3)).unwrap());
    gateway.pair(dev(4), "shed").unwrap();
    drop(gateway);

    let store = PairingDb::open(dir.path()).unwrap();
    let records = store.load_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].alias, "shed");
}

#[tokio::test]
async fn test_pair_upgrades_discovered_device() {
    let mut h = harness().await;
    h.air.push_frame(&presence(dev(1), "lamp"));
    h.gateway.poll_once().await.unwrap();
    assert!(!h.gateway.registry().lookup(&dev(1)).unwrap().is_paired());

    h.gateway.pair(dev(1), "lamp").unwrap();
    h.air.push_frame(&presence(dev(1), "lamp"));
    h.gateway.poll_once().await.unwrap();

    assert_eq!(h.gateway.registry().state_of(&dev(1)), Some(PeerState::Paging));
}

#[tokio::test]
async fn test_remove_online_device() {
    let mut h = harness().await;
    let _upstream = bring_online(&mut h, dev(1)).await;
    let socket = h.air.socket_for(&dev(1)).unwrap();

    assert!(h.gateway.remove_device(dev(1)).unwrap());
    assert!(h.gateway.registry().lookup(&dev(1)).is_none());
    assert_eq!(h.air.close_count(socket), 1);
    assert!(!h.gateway.remove_device(dev(1)).unwrap());
}

#[tokio::test]
async fn test_status_snapshot() {
    let mut h = harness().await;
    let _upstream = bring_online(&mut h, dev(1)).await;
    h.air.push_frame(&presence(dev(2), "new"));
    h.gateway.poll_once().await.unwrap();

    let status = h.gateway.status();
    assert!(status.adapter.powered);
    assert_eq!(status.adapter.max_peers, 5);
    assert_eq!(status.stats.online, 1);
    assert_eq!(status.stats.offline, 1);
    assert_eq!(status.bridges, 1);
    assert_eq!(status.peers.len(), 2);
    assert_eq!(status.beacons.len(), 1);
    assert_eq!(status.beacons[0].name(), "new");
}

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let mut h = harness().await;
    let _a = bring_online(&mut h, dev(1)).await;
    let _b = bring_online(&mut h, dev(2)).await;
    let s1 = h.air.socket_for(&dev(1)).unwrap();
    let s2 = h.air.socket_for(&dev(2)).unwrap();

    h.gateway.shutdown();
    h.gateway.shutdown();

    assert_eq!(h.air.close_count(s1), 1);
    assert_eq!(h.air.close_count(s2), 1);
    assert_eq!(h.air.open_sockets(), 0);
    assert_eq!(h.air.state(), RadioState::Stopped);
    assert!(h.gateway.registry().is_empty());
    assert!(h.gateway.beacons().is_empty());
    assert!(!h.gateway.context().powered);
}

#[tokio::test]
async fn test_run_serves_admin_handle() {
    let mut h = harness_with(GatewaySettings::new().with_poll_interval(Duration::from_millis(2))).await;
    let handle = h.gateway.handle();
    let air = h.air.clone();

    let (result, (paired_state, removed)) = tokio::join!(h.gateway.run(), async {
        handle.pair(dev(1), "lamp").await.unwrap();
        air.push_frame(&presence(dev(1), "lamp"));
        sleep(Duration::from_millis(50)).await;

        let status = handle.status().await.unwrap();
        let state = status.peers.iter().find(|p| p.address == dev(1)).map(|p| p.state);
        let removed = handle.remove_device(dev(1)).await.unwrap();
        handle.shutdown().await.unwrap();
        (state, removed)
    });

    result.unwrap();
    assert_eq!(paired_state, Some(PeerState::Paging));
    assert!(removed);
    assert_eq!(h.air.state(), RadioState::Stopped);
    assert!(!h.gateway.context().powered);
}

#[tokio::test]
async fn test_queued_shutdown_stops_run() {
    let mut h = harness().await;
    let handle = h.gateway.handle();
    handle.shutdown().await.unwrap();

    timeout(Duration::from_secs(2), h.gateway.run())
        .await
        .unwrap()
        .unwrap();
    assert!(!h.gateway.context().powered);
    assert_eq!(h.air.state(), RadioState::Stopped);
}

#[tokio::test]
async fn test_shutdown_releases_pending_connects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut gateway, air) = slow_gateway(&listener, 0).await;
    gateway.pair(dev(1), "lamp").unwrap();
    air.push_frame(&presence(dev(1), "lamp"));
    gateway.poll_once().await.unwrap();
    assert_eq!(gateway.pending_connects(), 1);

    gateway.shutdown();
    assert_eq!(gateway.pending_connects(), 0);
    assert_eq!(air.open_sockets(), 0);
}
