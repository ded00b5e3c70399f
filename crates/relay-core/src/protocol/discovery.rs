//! LAN discovery datagrams.
//!
//! Wire format:
//! ```text
//! [magic:4 = "RRLY"][kind:1][body:N]
//! ```
//!
//! | Kind   | Name         | Body                                           |
//! |--------|--------------|------------------------------------------------|
//! | `0x01` | Probe        | UTF-8 service type filter (empty = any)        |
//! | `0x02` | Announcement | `bincode`-encoded [`ServiceDescriptor`]        |
//!
//! A discovery client broadcasts a probe to the advertiser's UDP port; the
//! advertiser answers with one announcement per matching service.

use thiserror::Error;

use crate::domain::service::ServiceDescriptor;

/// Leading bytes of every discovery datagram.
pub const DISCOVERY_MAGIC: [u8; 4] = *b"RRLY";

pub const KIND_PROBE: u8 = 0x01;
pub const KIND_ANNOUNCEMENT: u8 = 0x02;

const HEADER_SIZE: usize = DISCOVERY_MAGIC.len() + 1;

/// Errors raised while encoding or decoding discovery datagrams.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The datagram is shorter than the 5-byte header.
    #[error("datagram too short: {0} bytes")]
    TooShort(usize),

    /// The datagram does not start with [`DISCOVERY_MAGIC`].
    #[error("bad magic bytes")]
    BadMagic,

    /// The kind byte is not a recognized value.
    #[error("unknown datagram kind: 0x{0:02X}")]
    UnknownKind(u8),

    /// The probe filter is not valid UTF-8.
    #[error("probe filter is not valid UTF-8")]
    InvalidFilter(#[from] std::str::Utf8Error),

    /// The announcement body could not be (de)serialized.
    #[error("announcement body: {0}")]
    Body(#[from] bincode::Error),
}

/// A decoded discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryDatagram {
    Probe { service_type: String },
    Announcement(ServiceDescriptor),
}

impl DiscoveryDatagram {
    /// Returns `true` when a probe's filter selects `service_type`.
    ///
    /// Always `false` for announcements.
    pub fn probe_matches(&self, service_type: &str) -> bool {
        match self {
            Self::Probe { service_type: filter } => {
                filter.is_empty() || filter == service_type
            }
            Self::Announcement(_) => false,
        }
    }
}

/// Encodes a probe for `service_type` (empty string matches every service).
pub fn encode_probe(service_type: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + service_type.len());
    buf.extend_from_slice(&DISCOVERY_MAGIC);
    buf.push(KIND_PROBE);
    buf.extend_from_slice(service_type.as_bytes());
    buf
}

/// Encodes an announcement carrying `service`.
///
/// # Errors
///
/// Returns [`DiscoveryError::Body`] if serialization fails.
pub fn encode_announcement(service: &ServiceDescriptor) -> Result<Vec<u8>, DiscoveryError> {
    let body = bincode::serialize(service)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&DISCOVERY_MAGIC);
    buf.push(KIND_ANNOUNCEMENT);
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decodes one discovery datagram.
///
/// # Errors
///
/// Returns a [`DiscoveryError`] describing why the bytes are not a valid
/// datagram.  Callers on the receive path should log and drop such packets.
pub fn decode_datagram(bytes: &[u8]) -> Result<DiscoveryDatagram, DiscoveryError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DiscoveryError::TooShort(bytes.len()));
    }
    if bytes[..DISCOVERY_MAGIC.len()] != DISCOVERY_MAGIC {
        return Err(DiscoveryError::BadMagic);
    }

    let body = &bytes[HEADER_SIZE..];
    match bytes[DISCOVERY_MAGIC.len()] {
        KIND_PROBE => Ok(DiscoveryDatagram::Probe {
            service_type: std::str::from_utf8(body)?.to_string(),
        }),
        KIND_ANNOUNCEMENT => Ok(DiscoveryDatagram::Announcement(bincode::deserialize(body)?)),
        other => Err(DiscoveryError::UnknownKind(other)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
