//! ConnectionServer: TCP listener, edge-triggered event loop, and lifecycle.
//!
//! # Threading model
//!
//! ```text
//!  caller thread(s)                     relay-worker thread
//!  ────────────────                     ───────────────────
//!  initialize() ── spawn ─────────────▶ EventLoop::run()
//!  broadcast() ──┐                        ├─ LISTENER  → accept until WouldBlock
//!  client_count()├─▶ registry (Mutex) ◀──┤─ client    → drain / tear down
//!  clients() ────┘                        └─ TERMINATE → return
//!  shutdown() ── Waker::wake ─────────▶
//!             ◀─ join (EventLoop) ─────
//! ```
//!
//! The multiplexer delivers edge-triggered readiness, so every readable
//! source is drained until `WouldBlock` before the loop waits again.
//!
//! Shutdown is signalled through a [`Waker`] registered on the same
//! multiplexer as the sockets, so the worker blocks with no timeout and
//! still exits promptly.
//!
//! Device input is drained with the registry lock released, and each readiness
//! event reads at most [`MAX_READS_PER_EVENT`] chunks, so a device that never
//! stops sending delays neither broadcasters nor the other devices.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use relay_core::{ClientInfo, HANDSHAKE_FRAME};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::client_handle::{ClientHandle, ReadOutcome};
use super::relay_handle::RelayHandle;

const LISTENER: Token = Token(0);
const TERMINATE: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

/// Scratch buffer size for draining device input.
const READ_CHUNK: usize = 1024;
/// Read budget per device per readiness event.
const MAX_READS_PER_EVENT: usize = 64;

/// Default pending-connection queue length.
pub const DEFAULT_BACKLOG: i32 = 5;
/// Default number of readiness events handled per wake-up.
pub const DEFAULT_EVENT_CAPACITY: usize = 5;

/// Lifecycle state of a [`ConnectionServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Listening,
    ShuttingDown,
    Stopped,
    /// The worker exited on its own after a multiplexer error.  Nothing is
    /// accepted any more; call `shutdown` to release the remaining resources.
    Failed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Listening => "listening",
            Self::ShuttingDown => "shutting down",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Errors raised while bringing the server up.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ServerState,
    },

    #[error("failed to create listening socket: {0}")]
    Socket(#[source] io::Error),

    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("listen failed on {addr}: {source}")]
    ListenFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to set up readiness multiplexer: {0}")]
    Multiplexer(#[source] io::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Tunables for a [`ConnectionServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Listen backlog passed to `listen(2)`.
    pub backlog: i32,
    /// Maximum readiness events processed per wake-up.
    pub event_capacity: usize,
    /// Frame written to every device right after it is accepted.
    pub handshake: Option<Vec<u8>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            handshake: Some(HANDSHAKE_FRAME.to_vec()),
        }
    }
}

impl ServerOptions {
    /// Same options, but accepted devices receive no handshake frame.
    pub fn without_handshake(mut self) -> Self {
        self.handshake = None;
        self
    }
}

/// The command relay server.
///
/// Accepts device connections on one TCP port and relays operator frames to
/// all of them.  See the module docs for the threading model.
pub struct ConnectionServer {
    options: ServerOptions,
    state: ServerState,
    relay: RelayHandle,
    local_addr: Option<SocketAddr>,
    waker: Option<Waker>,
    worker: Option<JoinHandle<EventLoop>>,
}

impl ConnectionServer {
    /// Creates an uninitialized server with default options.
    pub fn new() -> Self {
        Self::with_options(ServerOptions::default())
    }

    pub fn with_options(options: ServerOptions) -> Self {
        Self {
            options,
            state: ServerState::Uninitialized,
            relay: RelayHandle::new(),
            local_addr: None,
            waker: None,
            worker: None,
        }
    }

    /// Current lifecycle state.
    ///
    /// Reports [`ServerState::Failed`] once a listening server's worker has
    /// exited without being asked to.
    pub fn state(&self) -> ServerState {
        let worker_gone = self.worker.as_ref().is_some_and(JoinHandle::is_finished);
        if self.state == ServerState::Listening && worker_gone {
            ServerState::Failed
        } else {
            self.state
        }
    }

    /// Address the listener is bound to while the server is listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Returns a cloneable handle for broadcasting from other threads.
    pub fn handle(&self) -> RelayHandle {
        self.relay.clone()
    }

    /// Binds `0.0.0.0:port`, starts the multiplexer and spawns the worker.
    ///
    /// Port `0` binds an ephemeral port; see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// - [`ServerError::InvalidState`] unless the server is uninitialized.
    /// - [`ServerError::BindFailed`] if the port is in use or privileged.
    /// - Any other variant if a socket, multiplexer, or thread could not be
    ///   created.
    ///
    /// On error every resource created so far has already been released and
    /// the server stays uninitialized.
    pub fn initialize(&mut self, port: u16) -> Result<(), ServerError> {
        if self.state != ServerState::Uninitialized {
            return Err(ServerError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }

        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        let mut listener = TcpListener::from_std(bind_listener(addr, self.options.backlog)?);
        let local_addr = listener.local_addr().map_err(ServerError::Socket)?;

        let poll = Poll::new().map_err(ServerError::Multiplexer)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Multiplexer)?;
        let waker = Waker::new(poll.registry(), TERMINATE).map_err(ServerError::Multiplexer)?;

        let event_loop = EventLoop {
            poll,
            listener,
            relay: self.relay.clone(),
            handshake: self.options.handshake.clone(),
            event_capacity: self.options.event_capacity.max(1),
            next_token: FIRST_CLIENT_TOKEN,
        };
        let worker = thread::Builder::new()
            .name("relay-worker".into())
            .spawn(move || event_loop.run())
            .map_err(ServerError::Spawn)?;

        self.waker = Some(waker);
        self.worker = Some(worker);
        self.local_addr = Some(local_addr);
        self.state = ServerState::Listening;
        info!(addr = %local_addr, "relay listening");
        Ok(())
    }

    /// Stops the worker and releases every OS resource the server holds.
    ///
    /// Blocks until the worker has exited.  Remaining devices observe
    /// end-of-stream.  Also valid after the worker has failed.  Calling this in
    /// any other state logs and does nothing.
    ///
    /// If the worker cannot be signalled it is detached instead of joined,
    /// since a join would never return.  The detached worker keeps the
    /// multiplexer and the listening socket until the process exits; the
    /// devices are still closed and the state still becomes stopped.
    pub fn shutdown(&mut self) {
        if self.state != ServerState::Listening {
            debug!(state = %self.state, "shutdown ignored");
            return;
        }
        self.state = ServerState::ShuttingDown;

        let woken = match self.waker.as_ref().map(Waker::wake) {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                error!("failed to signal worker: {e}");
                false
            }
            None => false,
        };
        if let Some(worker) = self.worker.take() {
            if woken {
                // Dropping the returned loop closes the multiplexer and listener.
                if worker.join().is_err() {
                    error!("relay worker panicked");
                }
            } else {
                warn!("detaching relay worker");
            }
        }
        self.waker = None;

        let remaining = self.relay.take_all();
        let count = remaining.len();
        for client in &remaining {
            client.close();
        }

        self.local_addr = None;
        self.state = ServerState::Stopped;
        info!(closed = count, "relay stopped");
    }

    /// Sends `bytes` to every connected device.  See [`RelayHandle::broadcast`].
    pub fn broadcast(&self, bytes: &[u8]) -> usize {
        self.relay.broadcast(bytes)
    }

    /// Number of connected devices; `0` before initialize and after shutdown.
    pub fn client_count(&self) -> usize {
        self.relay.client_count()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.relay.clients()
    }
}

impl Default for ConnectionServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionServer {
    fn drop(&mut self) {
        if self.state == ServerState::Listening {
            self.shutdown();
        }
    }
}

/// Creates the non-blocking IPv4 listening socket.
fn bind_listener(addr: SocketAddr, backlog: i32) -> Result<std::net::TcpListener, ServerError> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(ServerError::Socket)?;
    if let Err(e) = socket.set_reuse_address(true) {
        warn!(%addr, "SO_REUSEADDR unavailable: {e}");
    }
    socket.set_nonblocking(true).map_err(ServerError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|source| ServerError::BindFailed { addr, source })?;
    socket
        .listen(backlog)
        .map_err(|source| ServerError::ListenFailed { addr, source })?;
    Ok(socket.into())
}

/// State owned by the worker thread.
///
/// Returned from [`EventLoop::run`] so the joining thread decides when the
/// multiplexer and listener are closed.
struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    relay: RelayHandle,
    handshake: Option<Vec<u8>>,
    event_capacity: usize,
    next_token: usize,
}

impl EventLoop {
    fn run(mut self) -> Self {
        let mut events = Events::with_capacity(self.event_capacity);
        let mut scratch = vec![0u8; READ_CHUNK];
        debug!("relay worker started");

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!("readiness wait failed, worker exiting: {e}");
                return self;
            }

            for event in events.iter() {
                match event.token() {
                    TERMINATE => {
                        debug!("relay worker received termination signal");
                        return self;
                    }
                    LISTENER => self.accept_pending(),
                    token => self.service_client(token, event, &mut scratch),
                }
            }
        }
    }

    /// Accepts every queued connection.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(e) = self
            .poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)
        {
            warn!(%peer, "failed to register connection: {e}");
            return;
        }

        let mut client = ClientHandle::new(stream, token, peer);
        if let Some(frame) = &self.handshake {
            match client.send(frame) {
                Ok(n) if n == frame.len() => {}
                Ok(n) => warn!(%peer, written = n, "handshake truncated"),
                Err(e) => {
                    warn!(%peer, "handshake failed: {e}");
                    client.deregister(self.poll.registry());
                    client.close();
                    return;
                }
            }
        }

        self.relay.insert(client);
        info!(%peer, token = token.0, "device connected");
    }

    fn service_client(&mut self, token: Token, event: &Event, scratch: &mut [u8]) {
        let Some(client) = self.relay.get(token) else {
            // Already removed by a failed broadcast.
            debug!(token = token.0, "event for unknown connection");
            return;
        };

        let hangup = event.is_error() || event.is_read_closed();
        if !hangup && client.drain_input(scratch, MAX_READS_PER_EVENT) == ReadOutcome::Open {
            return;
        }
        drop(client);

        // `None` means a broadcast removed it first and closes it itself.
        let Some(mut client) = self.relay.remove(token) else {
            return;
        };
        // Only the registry and this thread hold references, so the removed
        // handle is exclusive here.
        if let Some(exclusive) = Arc::get_mut(&mut client) {
            exclusive.deregister(self.poll.registry());
        }
        info!(peer = %client.peer_addr(), token = token.0, "device disconnected");
        client.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_new_server_is_uninitialized_with_no_clients() {
        let server = ConnectionServer::new();
        assert_eq!(server.state(), ServerState::Uninitialized);
        assert_eq!(server.client_count(), 0);
        assert!(server.local_addr().is_none());
    }

    #[test]
    fn test_default_options_send_the_handshake_frame() {
        let options = ServerOptions::default();
        assert_eq!(options.handshake.as_deref(), Some(&HANDSHAKE_FRAME[..]));
        assert_eq!(options.backlog, 5);
        assert_eq!(options.event_capacity, 5);
        assert!(options.without_handshake().handshake.is_none());
    }

    #[test]
    fn test_initialize_on_ephemeral_port_reports_bound_address() {
        // Arrange
        let mut server = ConnectionServer::new();

        // Act
        server.initialize(0).unwrap();

        // Assert
        assert_eq!(server.state(), ServerState::Listening);
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown();
    }

    #[test]
    fn test_initialize_twice_returns_invalid_state() {
        // Arrange
        let mut server = ConnectionServer::new();
        server.initialize(0).unwrap();

        // Act
        let result = server.initialize(0);

        // Assert
        assert!(matches!(
            result,
            Err(ServerError::InvalidState {
                operation: "initialize",
                state: ServerState::Listening
            })
        ));
        server.shutdown();
    }

    #[test]
    fn test_shutdown_moves_to_stopped_and_second_call_is_noop() {
        // Arrange
        let mut server = ConnectionServer::new();
        server.initialize(0).unwrap();

        // Act
        server.shutdown();
        server.shutdown();

        // Assert
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn test_shutdown_before_initialize_is_noop() {
        let mut server = ConnectionServer::new();
        server.shutdown();
        assert_eq!(server.state(), ServerState::Uninitialized);
    }

    #[test]
    fn test_stopped_server_cannot_be_reinitialized() {
        let mut server = ConnectionServer::new();
        server.initialize(0).unwrap();
        server.shutdown();
        assert!(matches!(
            server.initialize(0),
            Err(ServerError::InvalidState {
                state: ServerState::Stopped,
                ..
            })
        ));
    }

    #[test]
    fn test_worker_exiting_on_its_own_is_reported_as_failed() {
        // Arrange: wake the worker without going through shutdown, as a fatal
        // multiplexer error would end it
        let mut server = ConnectionServer::new();
        server.initialize(0).unwrap();
        server.waker.as_ref().unwrap().wake().unwrap();

        // Act
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.state() != ServerState::Failed && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        // Assert
        assert_eq!(server.state(), ServerState::Failed);
        server.shutdown();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[test]
    fn test_invalid_state_error_message_names_operation_and_state() {
        let err = ServerError::InvalidState {
            operation: "initialize",
            state: ServerState::Stopped,
        };
        assert_eq!(err.to_string(), "cannot initialize while stopped");
    }
}
