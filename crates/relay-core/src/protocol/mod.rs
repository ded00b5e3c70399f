//! Wire formats used by roomba-relay.
//!
//! - **`command`** – Roomba Open Interface frames sent from the relay to every
//!   connected device.  The relay never parses what devices send back.
//! - **`discovery`** – UDP datagrams exchanged between a discovery client and
//!   the relay's network advertiser.

pub mod command;
pub mod discovery;
