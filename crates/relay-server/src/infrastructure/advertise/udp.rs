//! UDP probe/announce advertiser.
//!
//! The advertiser binds a UDP socket on the discovery port (default 1445) and
//! answers probe datagrams with one announcement per published service whose
//! type matches the probe's filter.  Devices (or the [`probe`] helper) find
//! the relay by broadcasting a probe to the LAN.
//!
//! ```text
//!  device ── RRLY 01 "_roomba._tcp" ──▶ 255.255.255.255:1445
//!  relay  ◀─ RRLY 02 <ServiceDescriptor> ── unicast reply
//! ```
//!
//! # Read timeout
//!
//! The responder thread blocks in `recv_from` for at most 500 ms, then checks
//! the `running` flag, so [`shutdown`](ServiceAdvertiser::shutdown) returns
//! within that bound.
//!
//! # Name collisions
//!
//! Two services with the same name would be indistinguishable to a browsing
//! device.  A service added under a name already published by this
//! advertiser is renamed `"<name> #2"`, `"<name> #3"`, and so on.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use relay_core::protocol::discovery::{encode_announcement, encode_probe};
use relay_core::{decode_datagram, AdvertisementId, DiscoveryDatagram, ServiceDescriptor};
use tracing::{debug, error, info, warn};

use crate::application::advertise::{AdvertiseError, ServiceAdvertiser};

/// Default UDP port the advertiser answers probes on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 1445;

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_DATAGRAM: usize = 2048;

type ServiceTable = Vec<(AdvertisementId, ServiceDescriptor)>;

/// Answers LAN discovery probes for the services it publishes.
pub struct UdpAdvertiser {
    bind_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    services: Arc<Mutex<ServiceTable>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl UdpAdvertiser {
    /// Creates an advertiser that will listen on `0.0.0.0:discovery_port`.
    pub fn new(discovery_port: u16) -> Self {
        Self::with_bind_addr(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            discovery_port,
        )))
    }

    pub fn with_bind_addr(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            local_addr: None,
            services: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Address the discovery socket is bound to while initialized.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Descriptors currently published, as a device would see them.
    pub fn published(&self) -> Vec<ServiceDescriptor> {
        lock(&self.services)
            .iter()
            .map(|(_, service)| service.clone())
            .collect()
    }

    fn ensure_initialized(&self) -> Result<(), AdvertiseError> {
        if self.worker.is_some() {
            Ok(())
        } else {
            Err(AdvertiseError::NotInitialized)
        }
    }
}

impl ServiceAdvertiser for UdpAdvertiser {
    fn initialize(&mut self) -> Result<(), AdvertiseError> {
        if self.worker.is_some() {
            return Err(AdvertiseError::AlreadyInitialized);
        }

        let addr = self.bind_addr;
        let bind_err = |source| AdvertiseError::Bind { addr, source };
        let socket = UdpSocket::bind(addr).map_err(bind_err)?;
        socket.set_read_timeout(Some(READ_TIMEOUT)).map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        self.running.store(true, Ordering::Relaxed);
        let services = Arc::clone(&self.services);
        let running = Arc::clone(&self.running);
        let worker = std::thread::Builder::new()
            .name("relay-advertise".to_string())
            .spawn(move || responder_loop(socket, services, running))
            .map_err(|e| {
                self.running.store(false, Ordering::Relaxed);
                AdvertiseError::Spawn(e)
            })?;

        self.worker = Some(worker);
        self.local_addr = Some(local_addr);
        info!("discovery responder listening on UDP {local_addr}");
        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.running.store(false, Ordering::Relaxed);
        if worker.join().is_err() {
            error!("discovery responder panicked");
        }
        lock(&self.services).clear();
        self.local_addr = None;
    }

    fn add_service(
        &mut self,
        service: &ServiceDescriptor,
    ) -> Result<AdvertisementId, AdvertiseError> {
        self.ensure_initialized()?;
        if service.name.is_empty() || service.service_type.is_empty() {
            return Err(AdvertiseError::InvalidDescriptor(
                "name and service type must not be empty".to_string(),
            ));
        }

        let id = AdvertisementId::new();
        let mut services = lock(&self.services);
        let mut published = service.clone();
        published.name = unique_name(&services, &service.name);
        if published.name != service.name {
            info!(
                requested = %service.name,
                published = %published.name,
                "service name collision, renamed"
            );
        }
        debug!(%id, name = %published.name, "service published");
        services.push((id, published));
        Ok(id)
    }

    fn remove_service(&mut self, id: AdvertisementId) -> Result<(), AdvertiseError> {
        self.ensure_initialized()?;
        let mut services = lock(&self.services);
        let index = services
            .iter()
            .position(|(existing, _)| *existing == id)
            .ok_or(AdvertiseError::UnknownService(id))?;
        let (_, removed) = services.remove(index);
        debug!(%id, name = %removed.name, "service withdrawn");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "udp"
    }
}

impl Drop for UdpAdvertiser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Broadcasts (or unicasts) a probe to `target` and collects announcements
/// until `timeout` elapses.
///
/// An empty `service_type` asks for every service.
///
/// # Errors
///
/// Returns an I/O error if the probe socket cannot be created or the probe
/// cannot be sent.  Receive timeouts end the collection normally.
pub fn probe(
    target: SocketAddr,
    service_type: &str,
    timeout: Duration,
) -> io::Result<Vec<ServiceDescriptor>> {
    let socket = UdpSocket::bind(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))?;
    socket.set_broadcast(true)?;
    socket.send_to(&encode_probe(service_type), target)?;

    let deadline = Instant::now() + timeout;
    let mut found = Vec::new();
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket.set_read_timeout(Some(remaining))?;
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => break,
            Err(e) => return Err(e),
        };
        match decode_datagram(&buf[..len]) {
            Ok(DiscoveryDatagram::Announcement(service)) => found.push(service),
            Ok(DiscoveryDatagram::Probe { .. }) => {}
            Err(e) => debug!("ignoring malformed reply from {src}: {e}"),
        }
    }
    Ok(found)
}

/// The receive loop executed on the responder thread.
fn responder_loop(
    socket: UdpSocket,
    services: Arc<Mutex<ServiceTable>>,
    running: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("discovery recv error: {e}");
                continue;
            }
        };

        let probe = match decode_datagram(&buf[..len]) {
            Ok(probe @ DiscoveryDatagram::Probe { .. }) => probe,
            Ok(DiscoveryDatagram::Announcement(other)) => {
                debug!("ignoring announcement for '{}' from {src}", other.name);
                continue;
            }
            Err(e) => {
                debug!("failed to decode discovery datagram from {src}: {e}");
                continue;
            }
        };

        let replies: Vec<ServiceDescriptor> = lock(&services)
            .iter()
            .filter(|(_, service)| probe.probe_matches(&service.service_type))
            .map(|(_, service)| service.clone())
            .collect();
        debug!("probe from {src}: {} matching service(s)", replies.len());

        for service in &replies {
            match encode_announcement(service) {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, src) {
                        warn!("failed to send announcement to {src}: {e}");
                    }
                }
                Err(e) => error!("failed to encode announcement: {e}"),
            }
        }
    }

    info!("discovery responder stopped");
}

/// Picks `name`, or the first free `"<name> #n"` (n ≥ 2) among `services`.
fn unique_name(services: &ServiceTable, name: &str) -> String {
    let taken = |candidate: &str| services.iter().any(|(_, s)| s.name == candidate);
    if !taken(name) {
        return name.to_string();
    }
    (2u32..)
        .map(|n| format!("{name} #{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn lock(services: &Mutex<ServiceTable>) -> MutexGuard<'_, ServiceTable> {
    services.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
