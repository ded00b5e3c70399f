//! RelayHandle: the thread-safe broadcast/query facade.
//!
//! The handle wraps the client registry shared with the connection server's
//! worker thread.  It is cheap to clone and may be used from any thread while
//! the worker loop runs.
//!
//! # Locking discipline
//!
//! Every registry access (insert on accept, remove on teardown, iteration on
//! broadcast, size on query) happens under a single mutex.  The lock is held
//! only while touching the map and while issuing *non-blocking* writes, never
//! across a call that can block.  The worker drains device input on a cloned
//! `Arc` with the lock released.  Handles removed under the lock are closed
//! after it is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mio::Token;
use relay_core::ClientInfo;
use tracing::{debug, warn};

use super::client_handle::ClientHandle;
use crate::application::console::CommandSink;

type ClientMap = HashMap<Token, Arc<ClientHandle>>;

/// Cloneable access to the set of connected devices.
#[derive(Debug, Clone, Default)]
pub struct RelayHandle {
    clients: Arc<Mutex<ClientMap>>,
}

impl RelayHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sends `bytes` to every registered device.
    ///
    /// Best-effort: a failing device never stops delivery to the others and
    /// the failure is not returned.  Devices whose write fails with an error
    /// are removed from the registry and closed.  Devices whose socket buffer
    /// is full receive a truncated frame (logged, not retried).
    ///
    /// A device accepted concurrently with this call may or may not receive
    /// the frame.
    ///
    /// Returns the number of devices that accepted the whole frame.
    pub fn broadcast(&self, bytes: &[u8]) -> usize {
        let mut delivered = 0;
        let dead: Vec<Arc<ClientHandle>> = {
            let mut clients = self.lock();
            let mut failed = Vec::new();
            for (token, client) in clients.iter_mut() {
                match client.send(bytes) {
                    Ok(n) if n == bytes.len() => delivered += 1,
                    Ok(n) => warn!(
                        peer = %client.peer_addr(),
                        written = n,
                        len = bytes.len(),
                        "socket buffer full; frame truncated"
                    ),
                    Err(e) => {
                        warn!(peer = %client.peer_addr(), "send failed, dropping device: {e}");
                        failed.push(*token);
                    }
                }
            }
            failed
                .into_iter()
                .filter_map(|token| clients.remove(&token))
                .collect()
        };

        for client in dead {
            client.close();
        }
        debug!(delivered, len = bytes.len(), "broadcast complete");
        delivered
    }

    /// Number of registered devices at the time of the call.
    ///
    /// This is a snapshot: concurrent accepts and teardowns may change the
    /// real count as soon as the call returns.
    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of every registered device.
    pub fn clients(&self) -> Vec<ClientInfo> {
        let mut infos: Vec<ClientInfo> = self.lock().values().map(|c| c.info()).collect();
        infos.sort_by_key(|info| info.peer_addr);
        infos
    }

    fn lock(&self) -> MutexGuard<'_, ClientMap> {
        // A panic while holding the lock cannot leave the map half-updated:
        // every mutation is a single insert/remove.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, client: ClientHandle) {
        self.lock().insert(client.token(), Arc::new(client));
    }

    /// Shared reference to a registered device, for I/O outside the lock.
    pub(crate) fn get(&self, token: Token) -> Option<Arc<ClientHandle>> {
        self.lock().get(&token).cloned()
    }

    pub(crate) fn remove(&self, token: Token) -> Option<Arc<ClientHandle>> {
        self.lock().remove(&token)
    }

    /// Empties the registry, returning every handle for the caller to close.
    pub(crate) fn take_all(&self) -> Vec<Arc<ClientHandle>> {
        self.lock().drain().map(|(_, client)| client).collect()
    }
}

impl CommandSink for RelayHandle {
    fn broadcast(&self, frame: &[u8]) -> usize {
        RelayHandle::broadcast(self, frame)
    }

    fn client_count(&self) -> usize {
        RelayHandle::client_count(self)
    }

    fn clients(&self) -> Vec<ClientInfo> {
        RelayHandle::clients(self)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
