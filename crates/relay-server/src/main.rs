//! roomba-relay: broadcast Open Interface commands to every connected Roomba.
//!
//! Wires together the connection server, the service advertiser, and the
//! operator console, then runs until Ctrl-C, `quit`, or end of input.
//!
//! # Usage
//!
//! ```text
//! roomba-relay [OPTIONS]
//!
//! Options:
//!   --config <PATH>         Config file [env: RELAY_CONFIG]
//!   --port <PORT>           TCP port devices connect to [env: RELAY_PORT]
//!   --advertiser <BACKEND>  none | udp | file [env: RELAY_ADVERTISER]
//!   --no-handshake          Do not send the spin-up drive frame on accept
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, apply CLI overrides
//!  └─ ConnectionServer::initialize()   -- relay-worker thread
//!  └─ advertise_relay()                -- relay-advertise thread (udp)
//!  └─ console loop                     -- relay-console thread feeds stdin lines
//!  └─ withdraw_relay(), ConnectionServer::shutdown()
//! ```

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relay_server::application::advertise::{advertise_relay, withdraw_relay};
use relay_server::application::console::{handle_line, ConsoleAction};
use relay_server::infrastructure::advertise::build_advertiser;
use relay_server::infrastructure::network::{ConnectionServer, RelayHandle};
use relay_server::infrastructure::storage::config::{
    load_config, load_config_from, AdvertiserKind, RelayConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Relays operator commands to every Roomba connected over TCP.
#[derive(Debug, Parser)]
#[command(
    name = "roomba-relay",
    about = "Broadcast Open Interface commands to every connected Roomba",
    version
)]
struct Cli {
    /// Config file to read instead of the platform default.
    ///
    /// Unlike the platform default, this file must exist.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port devices connect to (overrides `server.port`).
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Advertisement backend: none, udp or file (overrides `advertise.backend`).
    #[arg(long, env = "RELAY_ADVERTISER")]
    advertiser: Option<AdvertiserKind>,

    /// Do not send the handshake drive frame to newly accepted devices.
    #[arg(long)]
    no_handshake: bool,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(backend) = self.advertiser {
            config.advertise.backend = backend;
        }
        if self.no_handshake {
            config.server.send_handshake = false;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    // `RUST_LOG` wins over the config file's level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("roomba-relay starting");

    // ── Connection server ─────────────────────────────────────────────────────
    let mut server = ConnectionServer::with_options(config.server.options());
    server
        .initialize(config.server.port)
        .with_context(|| format!("failed to start relay on port {}", config.server.port))?;
    let port = server
        .local_addr()
        .map_or(config.server.port, |addr| addr.port());

    // ── Service advertisement ─────────────────────────────────────────────────
    let mut advertiser = build_advertiser(&config.advertise);
    let advertisement = advertiser
        .as_deref_mut()
        .and_then(|a| advertise_relay(a, &config.advertise.descriptor(port)));

    info!("roomba-relay ready on port {port}.  Type 'help' for commands, Ctrl-C to exit.");
    run_console(server.handle()).await;

    // ── Orderly shutdown: advertisement first, then the relay ─────────────────
    if let Some(advertiser) = advertiser.as_deref_mut() {
        withdraw_relay(advertiser, advertisement);
    }
    server.shutdown();

    info!("roomba-relay stopped");
    Ok(())
}

/// Executes console lines until `quit`, end of input, or Ctrl-C.
async fn run_console(relay: RelayHandle) {
    let mut lines = spawn_stdin_reader();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut signal_armed = true;

    loop {
        tokio::select! {
            result = &mut ctrl_c, if signal_armed => match result {
                Ok(()) => {
                    info!("shutdown signal received");
                    return;
                }
                Err(e) => {
                    error!("failed to listen for Ctrl-C: {e}");
                    signal_armed = false;
                }
            },
            line = lines.recv() => {
                let Some(line) = line else {
                    info!("end of input");
                    return;
                };
                match handle_line(&line, &relay) {
                    Ok(ConsoleAction::Quit) => return,
                    Ok(ConsoleAction::Continue(message)) if message.is_empty() => {}
                    Ok(ConsoleAction::Continue(message)) => println!("{message}"),
                    Err(e) => eprintln!("error: {e}"),
                }
            }
        }
    }
}

/// Reads stdin on a dedicated thread and forwards each line.
///
/// The channel closes at end of input or on a read error.  The thread is
/// never joined: a blocking stdin read cannot be cancelled, and the process
/// exits without waiting for it.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("relay-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    // Console loop has exited.
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        error!("failed to spawn console thread: {e}");
    }
    rx
}
