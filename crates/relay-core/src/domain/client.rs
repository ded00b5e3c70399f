//! Read-only view of a connected device.

use std::net::SocketAddr;
use std::time::Duration;

/// Snapshot of one connected device, as reported by the relay.
///
/// Snapshots go stale immediately: the device may disconnect right after the
/// snapshot is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Remote address of the device connection.
    pub peer_addr: SocketAddr,
    /// Time since the connection was accepted.
    pub connected_for: Duration,
    /// Bytes the device has sent since it connected.
    pub bytes_received: u64,
}
