//! ClientHandle: one accepted device connection.
//!
//! A handle owns its non-blocking socket.  The registry stores it behind an
//! [`Arc`](std::sync::Arc) so the worker can drain input and a broadcaster can
//! write to the same connection without either holding the registry lock
//! while doing I/O.  Every operation therefore takes `&self`; the socket is
//! read and written through mio's `&TcpStream` impls.
//!
//! A handle is always removed from the registry *before*
//! [`ClientHandle::close`] runs, so the registry never holds a closed
//! connection.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use mio::net::TcpStream;
use mio::{Registry, Token};
use relay_core::ClientInfo;
use tracing::{debug, trace};

/// Result of draining a readable connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// The connection is still open.  Input may remain if the read budget ran
    /// out; the next segment from the device raises a fresh edge.
    Open,
    /// The peer closed its side, or the read failed.
    Closed,
}

/// One connected device.
#[derive(Debug)]
pub(crate) struct ClientHandle {
    stream: TcpStream,
    token: Token,
    peer_addr: SocketAddr,
    accepted_at: Instant,
    bytes_received: AtomicU64,
}

impl ClientHandle {
    /// Wraps an accepted, already multiplexer-registered stream.
    pub(crate) fn new(stream: TcpStream, token: Token, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            token,
            peer_addr,
            accepted_at: Instant::now(),
            bytes_received: AtomicU64::new(0),
        }
    }

    pub(crate) fn token(&self) -> Token {
        self.token
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns a snapshot for display.
    pub(crate) fn info(&self) -> ClientInfo {
        ClientInfo {
            peer_addr: self.peer_addr,
            connected_for: self.accepted_at.elapsed(),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }

    /// Writes `bytes` to the device without blocking.
    ///
    /// Returns how many bytes the kernel accepted.  A value smaller than
    /// `bytes.len()` means the socket buffer filled up; the rest of the frame
    /// is dropped, not queued.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the write fails for any reason
    /// other than a full socket buffer.
    pub(crate) fn send(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut stream = &self.stream;
        let mut written = 0;
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    /// Reads and discards buffered input, at most `max_reads` chunks.
    ///
    /// The relay defines no device-to-relay protocol; incoming bytes only
    /// prove the device is alive.  The budget keeps one chatty device from
    /// monopolising the worker.
    pub(crate) fn drain_input(&self, scratch: &mut [u8], max_reads: usize) -> ReadOutcome {
        let mut stream = &self.stream;
        let mut reads = 0;
        while reads < max_reads {
            match stream.read(scratch) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(n) => {
                    self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
                    reads += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::Open,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %self.peer_addr, "read failed: {e}");
                    return ReadOutcome::Closed;
                }
            }
        }
        trace!(peer = %self.peer_addr, "read budget exhausted");
        ReadOutcome::Open
    }

    /// Removes the connection from the multiplexer's interest list.
    pub(crate) fn deregister(&mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.stream) {
            debug!(peer = %self.peer_addr, "deregister failed: {e}");
        }
    }

    /// Shuts the connection down in both directions.
    ///
    /// The descriptor itself, and any multiplexer registration still attached
    /// to it, is released when the last reference to the handle drops.
    pub(crate) fn close(&self) {
        // ENOTCONN here just means the peer already went away.
        let _ = self.stream.shutdown(Shutdown::Both);
        debug!(peer = %self.peer_addr, token = self.token.0, "connection closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
