//! Application layer use cases for the relay server.
//!
//! Use cases here depend on traits, never on concrete sockets or files, so
//! they can be unit-tested with `mockall` doubles.
//!
//! # Sub-modules
//!
//! - **`advertise`** – The [`ServiceAdvertiser`](advertise::ServiceAdvertiser)
//!   port and the publish/withdraw sequence the binary runs around the
//!   server's lifetime.  Advertisement failures are logged and isolated; they
//!   never stop relaying.
//!
//! - **`console`** – Parses operator commands (`drive 200 500`, `raw 80 83`,
//!   `count`, ...) into Open Interface frames and hands them to a
//!   [`CommandSink`](console::CommandSink).

pub mod advertise;
pub mod console;
