//! Service advertisement descriptor and handle types.
//!
//! A [`ServiceDescriptor`] is the name/type/port tuple an advertiser
//! publishes so that devices on the LAN can find the relay without a
//! preconfigured address.  Advertisers copy the descriptor they are given;
//! the copy they keep may be rewritten later (for example renamed after a
//! name collision).

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything needed to publish one service on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// User-friendly instance name, e.g. `"Roomba Controller"`.
    pub name: String,
    /// Service type tag, e.g. `"_roomba._tcp"`.
    pub service_type: String,
    /// Service domain.  `None` means the backend's default (usually `local`).
    pub domain: Option<String>,
    /// Host name override.  `None` means the advertising machine.
    pub host: Option<String>,
    /// Opaque metadata published as a TXT record.
    pub metadata: Option<String>,
    /// TCP port devices should connect to.
    pub port: u16,
}

impl ServiceDescriptor {
    /// Creates a descriptor with no domain, host override, or metadata.
    pub fn new(name: impl Into<String>, service_type: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            domain: None,
            host: None,
            metadata: None,
            port,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// Opaque handle for one active advertisement.
///
/// Only meaningful to the advertiser instance that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdvertisementId(Uuid);

impl AdvertisementId {
    /// Allocates a new, globally unique id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form used in file names and log lines.
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }
}

impl Default for AdvertisementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AdvertisementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
