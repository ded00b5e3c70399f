//! # relay-core
//!
//! Shared library for roomba-relay containing the Roomba Open Interface
//! command frames, the LAN discovery datagram codec, and the service
//! advertisement descriptor types.
//!
//! It has no dependencies on sockets, threads, or the file system, so both
//! the relay server and any discovery client can link it.
//!
//! # Modules
//!
//! - **`protocol`** – Bytes on the wire.  `command` builds the fixed-layout
//!   Open Interface frames broadcast to devices (including the handshake frame
//!   sent on accept); `discovery` encodes the UDP probe/announcement datagrams.
//!
//! - **`domain`** – Plain data: what gets advertised on the network
//!   (`ServiceDescriptor`), the opaque handle returned for it, and the
//!   snapshot of a connected device (`ClientInfo`).

pub mod domain;
pub mod protocol;

pub use domain::client::ClientInfo;
pub use domain::service::{AdvertisementId, ServiceDescriptor};
pub use protocol::command::{CommandError, OiCommand, HANDSHAKE_FRAME};
pub use protocol::discovery::{decode_datagram, DiscoveryDatagram, DiscoveryError};
