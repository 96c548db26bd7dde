// Admission Controller Tests
// Tests for the capacity and identity checks on presence events

use nrfgate::admission::{Admission, AdmissionController, AdmissionError, DEFAULT_MAX_PEERS};
use nrfgate::peer::{PeerRegistry, PeerState};
use nrfgate::radio::RadioSocket;
use nrfgate::session::SourceId;
use nrfgate::wire::RadioAddress;

fn addr(n: u8) -> RadioAddress {
    RadioAddress::from_bytes([0xAD, 0, 0, 0, 0, 0, 0, n])
}

fn paired_registry(count: u8) -> PeerRegistry {
    let mut registry = PeerRegistry::new();
    for n in 0..count {
        registry.register_known(addr(n), "dev", true);
    }
    registry
}

#[test]
fn test_default_ceiling() {
    assert_eq!(AdmissionController::default().max_peers(), DEFAULT_MAX_PEERS);
    assert_eq!(DEFAULT_MAX_PEERS, 5);
}

#[test]
fn test_paired_offline_proceeds_without_state_change() {
    let controller = AdmissionController::default();
    let mut registry = paired_registry(1);

    let admission = controller.admit(&mut registry, addr(0), "dev").unwrap();
    assert_eq!(admission, Admission::Proceed);
    assert!(admission.should_connect());
    assert_eq!(registry.state_of(&addr(0)), Some(PeerState::Offline));
}

#[test]
fn test_unknown_is_registered_unpaired() {
    let controller = AdmissionController::default();
    let mut registry = PeerRegistry::new();

    assert_eq!(controller.admit(&mut registry, addr(7), "unknown"), Ok(Admission::Registered));

    let peer = registry.lookup(&addr(7)).unwrap();
    assert_eq!(peer.state(), PeerState::Offline);
    assert!(!peer.is_paired());
    assert_eq!(peer.alias(), "unknown");
}

#[test]
fn test_known_unpaired_waits() {
    let controller = AdmissionController::default();
    let mut registry = PeerRegistry::new();
    registry.register_known(addr(1), "door", false);

    assert_eq!(controller.admit(&mut registry, addr(1), "door"), Ok(Admission::AwaitingPairing));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_paging_duplicate_is_harmless() {
    let controller = AdmissionController::default();
    let mut registry = paired_registry(1);
    registry.mark_paging(&addr(0)).unwrap();

    assert_eq!(controller.admit(&mut registry, addr(0), "dev"), Ok(Admission::InProgress));
    assert_eq!(registry.count(PeerState::Paging), 1);
}

#[test]
fn test_online_address_is_identity_conflict() {
    let controller = AdmissionController::default();
    let mut registry = paired_registry(1);
    registry.mark_paging(&addr(0)).unwrap();
    registry
        .mark_online(&addr(0), RadioSocket::from_raw(4), SourceId::from_raw(0))
        .unwrap();

    assert_eq!(
        controller.admit(&mut registry, addr(0), "dev"),
        Err(AdmissionError::IdentityConflict(addr(0)))
    );

    let peer = registry.lookup(&addr(0)).unwrap();
    assert_eq!(peer.state(), PeerState::Online);
    assert_eq!(peer.radio_socket(), Some(RadioSocket::from_raw(4)));
}

#[test]
fn test_capacity_counts_paging_and_online() {
    let controller = AdmissionController::new(2);
    let mut registry = paired_registry(3);
    registry.mark_paging(&addr(0)).unwrap();
    registry.mark_paging(&addr(1)).unwrap();
    registry
        .mark_online(&addr(1), RadioSocket::from_raw(1), SourceId::from_raw(0))
        .unwrap();

    assert_eq!(
        controller.admit(&mut registry, addr(2), "dev"),
        Err(AdmissionError::CapacityExceeded { active: 2, max: 2 })
    );
    assert_eq!(registry.state_of(&addr(2)), Some(PeerState::Offline));
}

#[test]
fn test_capacity_rejects_unknown_without_registering() {
    let controller = AdmissionController::new(1);
    let mut registry = paired_registry(1);
    registry.mark_paging(&addr(0)).unwrap();

    assert!(controller.admit(&mut registry, addr(9), "new").is_err());
    assert!(registry.lookup(&addr(9)).is_none());
}

#[test]
fn test_max_peers_plus_one() {
    let controller = AdmissionController::default();
    let mut registry = paired_registry(DEFAULT_MAX_PEERS as u8 + 1);

    let mut paging = 0;
    let mut rejected = 0;
    for n in 0..=DEFAULT_MAX_PEERS as u8 {
        match controller.admit(&mut registry, addr(n), "dev") {
            Ok(Admission::Proceed) => {
                registry.mark_paging(&addr(n)).unwrap();
                paging += 1;
            }
            Err(AdmissionError::CapacityExceeded { .. }) => rejected += 1,
            other => panic!("unexpected admission {:?}", other),
        }
        assert!(registry.active_count() <= DEFAULT_MAX_PEERS);
    }

    assert_eq!(paging, DEFAULT_MAX_PEERS);
    assert_eq!(rejected, 1);
}
