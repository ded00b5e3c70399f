//! Integration tests for the service advertisement backends.
//!
//! The UDP tests run a real responder on loopback and discover it with the
//! public [`probe`] helper, exactly as a device on the LAN would.  The
//! file-drop tests point the backend at a scratch directory instead of
//! `/etc/avahi/services`.

use std::fs;
use std::time::Duration;

use relay_core::ServiceDescriptor;
use relay_server::application::advertise::{advertise_relay, withdraw_relay, ServiceAdvertiser};
use relay_server::infrastructure::advertise::udp::probe;
use relay_server::infrastructure::advertise::{FileDropAdvertiser, UdpAdvertiser};
use relay_server::infrastructure::network::ConnectionServer;
use relay_server::infrastructure::storage::config::AdvertiseConfig;

const PROBE_WINDOW: Duration = Duration::from_millis(400);

fn loopback_udp_advertiser() -> UdpAdvertiser {
    let mut advertiser = UdpAdvertiser::with_bind_addr("127.0.0.1:0".parse().unwrap());
    advertiser.initialize().expect("initialize");
    advertiser
}

// ── UDP backend ───────────────────────────────────────────────────────────────

#[test]
fn test_probe_discovers_published_relay() {
    // Arrange
    let mut advertiser = loopback_udp_advertiser();
    let service = ServiceDescriptor::new("Roomba Controller", "_roomba._tcp", 1444)
        .with_metadata("fleet=lab");
    advertiser.add_service(&service).unwrap();
    let target = advertiser.local_addr().unwrap();

    // Act
    let found = probe(target, "_roomba._tcp", PROBE_WINDOW).unwrap();

    // Assert
    assert_eq!(found, vec![service]);
    advertiser.shutdown();
}

#[test]
fn test_probe_filter_excludes_other_service_types() {
    // Arrange
    let mut advertiser = loopback_udp_advertiser();
    advertiser
        .add_service(&ServiceDescriptor::new("Roomba Controller", "_roomba._tcp", 1444))
        .unwrap();
    advertiser
        .add_service(&ServiceDescriptor::new("Telemetry", "_telemetry._udp", 9000))
        .unwrap();
    let target = advertiser.local_addr().unwrap();

    // Act
    let filtered = probe(target, "_telemetry._udp", PROBE_WINDOW).unwrap();
    let everything = probe(target, "", PROBE_WINDOW).unwrap();

    // Assert
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].name, "Telemetry");
    assert_eq!(everything.len(), 2);
    advertiser.shutdown();
}

#[test]
fn test_removed_service_is_no_longer_announced() {
    // Arrange
    let mut advertiser = loopback_udp_advertiser();
    let id = advertiser
        .add_service(&ServiceDescriptor::new("Roomba Controller", "_roomba._tcp", 1444))
        .unwrap();
    let target = advertiser.local_addr().unwrap();

    // Act
    advertiser.remove_service(id).unwrap();
    let found = probe(target, "", PROBE_WINDOW).unwrap();

    // Assert
    assert!(found.is_empty());
    advertiser.shutdown();
}

#[test]
fn test_colliding_names_are_announced_distinctly() {
    // Arrange
    let mut advertiser = loopback_udp_advertiser();
    let service = ServiceDescriptor::new("Roomba Controller", "_roomba._tcp", 1444);
    advertiser.add_service(&service).unwrap();
    advertiser.add_service(&service).unwrap();
    let target = advertiser.local_addr().unwrap();

    // Act
    let mut names: Vec<String> = probe(target, "_roomba._tcp", PROBE_WINDOW)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    names.sort();

    // Assert
    assert_eq!(names, vec!["Roomba Controller", "Roomba Controller #2"]);
    advertiser.shutdown();
}

/// Advertising is independent of relaying: the relay keeps serving even when
/// the advertiser cannot start.
#[test]
fn test_relay_runs_even_when_advertiser_fails() {
    // Arrange
    let mut server = ConnectionServer::new();
    server.initialize(0).unwrap();
    let port = server.local_addr().unwrap().port();
    let mut advertiser = FileDropAdvertiser::new("/definitely/not/a/real/dir");

    // Act
    let id = advertise_relay(&mut advertiser, &AdvertiseConfig::default().descriptor(port));

    // Assert
    assert!(id.is_none());
    assert_eq!(server.broadcast(&[0x80]), 0);
    withdraw_relay(&mut advertiser, id);
    server.shutdown();
}

// ── File-drop backend ─────────────────────────────────────────────────────────

#[test]
fn test_advertise_and_withdraw_relay_with_file_drop() {
    // Arrange
    let dir = std::env::temp_dir().join(format!("roomba-relay-it-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let mut advertiser = FileDropAdvertiser::new(&dir);
    let descriptor = AdvertiseConfig::default().descriptor(1444);

    // Act
    let id = advertise_relay(&mut advertiser, &descriptor).expect("advertised");
    let path = advertiser.service_file(id).unwrap().to_path_buf();
    let xml = fs::read_to_string(&path).unwrap();
    withdraw_relay(&mut advertiser, Some(id));

    // Assert
    assert!(xml.contains("<type>_roomba._tcp</type>"));
    assert!(xml.contains("<port>1444</port>"));
    assert!(!path.exists(), "service file must be removed on withdraw");
    fs::remove_dir_all(&dir).unwrap();
}
