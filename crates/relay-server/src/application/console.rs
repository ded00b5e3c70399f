//! Operator console: one text command per line, broadcast as command frames.
//!
//! The console is transport-agnostic.  It turns a line such as `drive 200 -500`
//! into bytes and hands them to a [`CommandSink`]; the binary wires the sink to
//! the running relay and feeds it lines from stdin.

use std::fmt::Write as _;
use std::num::ParseIntError;

use relay_core::protocol::command::encode_script;
use relay_core::{ClientInfo, CommandError, OiCommand};
use thiserror::Error;

/// Where console commands are delivered.
#[cfg_attr(test, mockall::automock)]
pub trait CommandSink {
    /// Sends `frame` to every connected device; returns how many received it.
    fn broadcast(&self, frame: &[u8]) -> usize;

    /// Number of connected devices.
    fn client_count(&self) -> usize;

    /// Snapshot of the connected devices.
    fn clients(&self) -> Vec<ClientInfo>;
}

/// Errors produced while interpreting a console line.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    #[error("'{command}' needs a {argument} argument")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("'{value}' is not a valid number: {source}")]
    InvalidNumber {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("'{0}' is not a hex byte string")]
    InvalidHex(String),
}

/// What the console loop should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Keep reading; print the message if it is not empty.
    Continue(String),
    /// Stop reading and shut the relay down.
    Quit,
}

pub const HELP: &str = "\
commands:
  start                    start the Open Interface
  safe                     enter safe mode
  full                     enter full mode
  init                     start, then safe mode, in one frame
  drive <velocity> <radius> drive (mm/s, mm)
  straight <velocity>      drive straight
  spin <velocity>          spin in place (positive = counter-clockwise)
  stop                     stop the wheels
  raw <hex bytes>          broadcast raw bytes, e.g. 'raw 80 83'
  count                    number of connected devices
  clients                  list connected devices
  help                     show this text
  quit                     shut down the relay";

/// Interprets one console line against `sink`.
///
/// # Errors
///
/// Returns a [`ConsoleError`] describing why the line could not be executed.
/// Nothing is broadcast in that case.
pub fn handle_line(line: &str, sink: &dyn CommandSink) -> Result<ConsoleAction, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(ConsoleAction::Continue(String::new()));
    };

    let frame = match command.to_ascii_lowercase().as_str() {
        "quit" | "exit" => return Ok(ConsoleAction::Quit),
        "help" => return Ok(ConsoleAction::Continue(HELP.to_string())),
        "count" => {
            let n = sink.client_count();
            return Ok(ConsoleAction::Continue(format!("{n} device(s) connected")));
        }
        "clients" => return Ok(ConsoleAction::Continue(describe_clients(&sink.clients()))),
        "start" => OiCommand::Start.encode(),
        "safe" => OiCommand::Safe.encode(),
        "full" => OiCommand::Full.encode(),
        "stop" => OiCommand::Stop.encode(),
        "drive" => {
            let velocity = number(words.next(), "drive", "velocity")?;
            let radius = number(words.next(), "drive", "radius")?;
            OiCommand::drive(velocity, radius)?.encode()
        }
        "straight" => OiCommand::straight(number(words.next(), "straight", "velocity")?)?.encode(),
        "spin" => OiCommand::spin(number(words.next(), "spin", "velocity")?)?.encode(),
        "init" => encode_script(&[OiCommand::Start, OiCommand::Safe]),
        "raw" => {
            let hex: String = words.collect();
            if hex.is_empty() {
                return Err(ConsoleError::MissingArgument {
                    command: "raw",
                    argument: "hex bytes",
                });
            }
            parse_hex(&hex)?
        }
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };

    let delivered = sink.broadcast(&frame);
    Ok(ConsoleAction::Continue(format!(
        "sent {} byte(s) to {delivered} device(s)",
        frame.len()
    )))
}

fn number(
    word: Option<&str>,
    command: &'static str,
    argument: &'static str,
) -> Result<i16, ConsoleError> {
    let value = word.ok_or(ConsoleError::MissingArgument { command, argument })?;
    value.parse().map_err(|source| ConsoleError::InvalidNumber {
        value: value.to_string(),
        source,
    })
}

/// Parses `"8083"`, `"0x80 0x83"` or `"80 83"` (already concatenated) into bytes.
fn parse_hex(hex: &str) -> Result<Vec<u8>, ConsoleError> {
    let digits = hex.replace("0x", "").replace("0X", "");
    let well_formed = !digits.is_empty()
        && digits.len() % 2 == 0
        && digits.chars().all(|c| c.is_ascii_hexdigit());
    if !well_formed {
        return Err(ConsoleError::InvalidHex(hex.to_string()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
        .collect::<Result<_, _>>()
        .map_err(|_| ConsoleError::InvalidHex(hex.to_string()))
}

fn describe_clients(clients: &[ClientInfo]) -> String {
    if clients.is_empty() {
        return "no devices connected".to_string();
    }
    let mut out = String::new();
    for info in clients {
        let _ = writeln!(
            out,
            "{}  connected {}s  received {} byte(s)",
            info.peer_addr,
            info.connected_for.as_secs(),
            info.bytes_received
        );
    }
    out.pop();
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
