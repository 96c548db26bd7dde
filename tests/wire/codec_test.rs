// Codec Tests
// Tests for management frame decoding and advertised name validation

use nrfgate::wire::{
    advertised_name, decode, Frame, RadioAddress, WireError, HEADER_SIZE, OP_EVT_BCAST_PRESENCE,
    OP_EVT_CONNECTED, OP_EVT_DISCONNECTED,
};

fn addr(n: u8) -> RadioAddress {
    RadioAddress::from_bytes([n, 1, 2, 3, 4, 5, 6, 7])
}

fn presence_bytes(address: RadioAddress, name: &[u8]) -> Vec<u8> {
    let mut bytes = OP_EVT_BCAST_PRESENCE.to_le_bytes().to_vec();
    bytes.extend_from_slice(address.as_bytes());
    bytes.extend_from_slice(name);
    bytes
}

// ============================================================================
// DECODING
// ============================================================================

#[test]
fn test_decode_presence_with_name() {
    let frame = decode(&presence_bytes(addr(1), b"sensor")).unwrap();

    assert_eq!(
        frame,
        Frame::Presence {
            address: addr(1),
            name: b"sensor".to_vec(),
        }
    );
}

#[test]
fn test_presence_name_length_follows_received_size() {
    // 2 header + 8 address + 3 name bytes
    let bytes = presence_bytes(addr(2), b"abc");
    assert_eq!(bytes.len(), HEADER_SIZE + 8 + 3);

    match decode(&bytes).unwrap() {
        Frame::Presence { name, .. } => assert_eq!(name.len(), 3),
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn test_decode_presence_without_name() {
    match decode(&presence_bytes(addr(3), b"")).unwrap() {
        Frame::Presence { address, name } => {
            assert_eq!(address, addr(3));
            assert!(name.is_empty());
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn test_decode_connected() {
    let mut bytes = OP_EVT_CONNECTED.to_le_bytes().to_vec();
    bytes.extend_from_slice(addr(4).as_bytes());
    bytes.extend_from_slice(addr(9).as_bytes());

    assert_eq!(
        decode(&bytes).unwrap(),
        Frame::Connected {
            peer: addr(4),
            local: addr(9),
        }
    );
}

#[test]
fn test_decode_disconnected() {
    let mut bytes = OP_EVT_DISCONNECTED.to_le_bytes().to_vec();
    bytes.extend_from_slice(addr(5).as_bytes());

    assert_eq!(decode(&bytes).unwrap(), Frame::Disconnected { address: addr(5) });
}

#[test]
fn test_decode_ignored_broadcasts() {
    assert_eq!(decode(&[0x02, 0x02]).unwrap(), Frame::SetupBroadcast);
    assert_eq!(decode(&[0x03, 0x02, 0xFF]).unwrap(), Frame::Broadcast);
}

#[test]
fn test_encode_matches_decode() {
    let frame = Frame::Disconnected { address: addr(6) };
    assert_eq!(decode(&frame.encode()).unwrap(), frame);
}

// ============================================================================
// MALFORMED FRAMES
// ============================================================================

#[test]
fn test_decode_too_short() {
    assert_eq!(decode(&[]), Err(WireError::TooShort(0)));
    assert_eq!(decode(&[0x01]), Err(WireError::TooShort(1)));
}

#[test]
fn test_decode_non_event_opcode() {
    assert_eq!(decode(&[0x01, 0x00, 0xAA]), Err(WireError::NotAnEvent(0x0001)));
}

#[test]
fn test_decode_unknown_event() {
    assert_eq!(decode(&[0xFF, 0x02]), Err(WireError::UnknownOpcode(0x02FF)));
}

#[test]
fn test_decode_truncated_presence() {
    let mut bytes = OP_EVT_BCAST_PRESENCE.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[1, 2, 3]);

    assert_eq!(
        decode(&bytes),
        Err(WireError::TruncatedPayload {
            opcode: OP_EVT_BCAST_PRESENCE,
            len: 3,
        })
    );
}

#[test]
fn test_decode_truncated_connected() {
    let mut bytes = OP_EVT_CONNECTED.to_le_bytes().to_vec();
    bytes.extend_from_slice(addr(1).as_bytes());

    assert!(matches!(
        decode(&bytes),
        Err(WireError::TruncatedPayload { opcode: OP_EVT_CONNECTED, len: 8 })
    ));
}

// ============================================================================
// ADVERTISED NAME
// ============================================================================

#[test]
fn test_name_trailing_nuls_trimmed() {
    assert_eq!(advertised_name(b"lamp\0\0\0"), Some("lamp"));
}

#[test]
fn test_name_empty_or_padding_only() {
    assert_eq!(advertised_name(b""), None);
    assert_eq!(advertised_name(b"\0\0"), None);
}

#[test]
fn test_name_invalid_utf8() {
    assert_eq!(advertised_name(&[0x66, 0xFF, 0xFE]), None);
}

#[test]
fn test_name_utf8_multibyte() {
    assert_eq!(advertised_name("caf\u{e9}".as_bytes()), Some("caf\u{e9}"));
}
