//! Infrastructure layer for the relay server.
//!
//! Contains OS-facing adapters: the TCP connection server, the service
//! advertisement backends, and configuration file storage.
//!
//! **Dependency rule**: this layer depends on `relay_core` and implements the
//! port traits declared in `application` (`ServiceAdvertiser`,
//! `CommandSink`).  The application layer never names a concrete adapter.

pub mod advertise;
pub mod network;
pub mod storage;
