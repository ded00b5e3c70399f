//! Integration tests for the relay-core public API.
//!
//! These exercise the crate-root re-exports the way the relay server and the
//! operator console use them: building command frames, and exchanging a
//! probe/announcement pair for LAN discovery.

use relay_core::{
    decode_datagram,
    protocol::{
        command::{encode_script, OPCODE_DRIVE},
        discovery::{encode_announcement, encode_probe},
    },
    CommandError, DiscoveryDatagram, OiCommand, ServiceDescriptor, HANDSHAKE_FRAME,
};

#[test]
fn test_handshake_frame_is_five_bytes_starting_with_drive_opcode() {
    assert_eq!(HANDSHAKE_FRAME.len(), 5);
    assert_eq!(HANDSHAKE_FRAME[0], OPCODE_DRIVE);
    // velocity 0x01F4 = 500 mm/s, radius 0
    assert_eq!(&HANDSHAKE_FRAME[1..], &[0x01, 0xF4, 0x00, 0x00]);
}

#[test]
fn test_startup_script_puts_device_in_safe_mode_then_stops() {
    // Arrange: the sequence the console sends for `start` followed by `safe`
    let script = [OiCommand::Start, OiCommand::Safe, OiCommand::Stop];

    // Act
    let bytes = encode_script(&script);

    // Assert
    assert_eq!(bytes.len(), 1 + 1 + 5);
    assert_eq!(bytes[0], 0x80);
    assert_eq!(bytes[1], 0x83);
    assert_eq!(&bytes[2..], &[0x89, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn test_drive_limits_are_inclusive() {
    assert!(OiCommand::drive(500, 2000).is_ok());
    assert!(OiCommand::drive(-500, -2000).is_ok());
    assert_eq!(
        OiCommand::drive(0, -2001),
        Err(CommandError::RadiusOutOfRange(-2001))
    );
}

#[test]
fn test_probe_answered_by_announcement_for_matching_service() {
    // Arrange: what a discovery client sends, and what the advertiser replies
    let service = ServiceDescriptor::new("Roomba Controller", "_roomba._tcp", 1444);
    let probe = decode_datagram(&encode_probe("_roomba._tcp")).unwrap();

    // Act
    let reply = if probe.probe_matches(&service.service_type) {
        Some(encode_announcement(&service).unwrap())
    } else {
        None
    };

    // Assert
    let reply = reply.expect("matching probe must produce an announcement");
    match decode_datagram(&reply).unwrap() {
        DiscoveryDatagram::Announcement(announced) => {
            assert_eq!(announced.name, "Roomba Controller");
            assert_eq!(announced.port, 1444);
        }
        other => panic!("expected announcement, got {other:?}"),
    }
}
