//! Network infrastructure for the relay server.
//!
//! # Sub-modules
//!
//! - **`connection_server`** – Owns the listening socket, the edge-triggered
//!   readiness multiplexer, the termination waker and the worker thread that
//!   accepts devices and tears down dead connections.
//!
//! - **`client_handle`** – One accepted device connection: the socket, the
//!   peer address and a few liveness counters.
//!
//! - **`relay_handle`** – The cloneable, thread-safe facade (`broadcast`,
//!   `client_count`) that controllers call while the worker loop runs.

pub(crate) mod client_handle;
pub mod connection_server;
pub mod relay_handle;

pub use connection_server::{ConnectionServer, ServerError, ServerOptions, ServerState};
pub use relay_handle::RelayHandle;
