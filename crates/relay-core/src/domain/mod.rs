//! Domain types shared between the relay, its operator console, and its
//! advertisement backends.

pub mod client;
pub mod service;
