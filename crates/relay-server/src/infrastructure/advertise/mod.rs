//! Service advertisement backends.
//!
//! # Sub-modules
//!
//! - **`udp`** – Answers `RRLY` probe datagrams on the discovery port with
//!   announcements.  Works on any host, no daemon required.
//!
//! - **`file_drop`** – Writes Avahi `service-group` files into the daemon's
//!   watched directory so the relay shows up over mDNS.
//!
//! Both implement [`ServiceAdvertiser`].  The connection server never sees an
//! advertiser; `main` wires one up next to it.

pub mod file_drop;
pub mod udp;

pub use file_drop::FileDropAdvertiser;
pub use udp::UdpAdvertiser;

use crate::application::advertise::ServiceAdvertiser;
use crate::infrastructure::storage::config::{AdvertiseConfig, AdvertiserKind};

/// Builds the backend selected by `config`, or `None` when advertising is off.
pub fn build_advertiser(config: &AdvertiseConfig) -> Option<Box<dyn ServiceAdvertiser>> {
    match config.backend {
        AdvertiserKind::None => None,
        AdvertiserKind::Udp => Some(Box::new(UdpAdvertiser::new(config.discovery_port))),
        AdvertiserKind::File => Some(Box::new(FileDropAdvertiser::new(&config.service_dir))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
