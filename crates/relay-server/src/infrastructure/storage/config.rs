//! TOML-based configuration for the relay.
//!
//! Read from an explicit path (`--config`) or from the platform config file:
//! - Windows:  `%APPDATA%\RoombaRelay\config.toml`
//! - Linux:    `~/.config/roomba-relay/config.toml` (or `$XDG_CONFIG_HOME`)
//! - macOS:    `~/Library/Application Support/RoombaRelay/config.toml`
//!
//! ```toml
//! log_level = "debug"
//!
//! [server]
//! port = 1444
//! send_handshake = true
//!
//! [advertise]
//! backend = "udp"
//! name = "Roomba Controller"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing table, or a
//! missing key all fall back to the values listed in the field docs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use relay_core::{ServiceDescriptor, HANDSHAKE_FRAME};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::advertise::file_drop::AVAHI_SERVICE_DIR;
use crate::infrastructure::advertise::udp::DEFAULT_DISCOVERY_PORT;
use crate::infrastructure::network::ServerOptions;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// An advertiser backend name is not one of `none`, `udp`, `file`.
    #[error("unknown advertiser backend '{0}' (expected none, udp or file)")]
    UnknownAdvertiser(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub advertise: AdvertiseConfig,
    /// `tracing` filter used when `RUST_LOG` is unset.  Default `"info"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Connection server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port devices connect to.  Default `1444`.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Send the 5-byte handshake drive frame on accept.  Default `true`.
    #[serde(default = "default_true")]
    pub send_handshake: bool,
    /// Readiness events handled per wake-up.  Default `5`.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Listen backlog.  Default `5`.
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

/// Which advertisement backend to run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdvertiserKind {
    /// Do not advertise.
    None,
    /// Answer UDP discovery probes.
    #[default]
    Udp,
    /// Drop an Avahi service file into `service_dir`.
    File,
}

impl FromStr for AdvertiserKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "udp" => Ok(Self::Udp),
            "file" => Ok(Self::File),
            _ => Err(ConfigError::UnknownAdvertiser(s.to_string())),
        }
    }
}

impl fmt::Display for AdvertiserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Udp => "udp",
            Self::File => "file",
        })
    }
}

/// Service advertisement settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdvertiseConfig {
    /// Default `udp`.
    #[serde(default)]
    pub backend: AdvertiserKind,
    /// Default `"Roomba Controller"`.
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Default `"_roomba._tcp"`.
    #[serde(default = "default_service_type")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Opaque metadata (published as a TXT record).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    /// UDP port the `udp` backend answers probes on.  Default `1445`.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Directory the `file` backend writes to.  Default `/etc/avahi/services`.
    #[serde(default = "default_service_dir")]
    pub service_dir: PathBuf,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    1444
}
fn default_true() -> bool {
    true
}
fn default_event_capacity() -> usize {
    5
}
fn default_backlog() -> i32 {
    5
}
fn default_service_name() -> String {
    "Roomba Controller".to_string()
}
fn default_service_type() -> String {
    "_roomba._tcp".to_string()
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_service_dir() -> PathBuf {
    PathBuf::from(AVAHI_SERVICE_DIR)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            send_handshake: true,
            event_capacity: default_event_capacity(),
            backlog: default_backlog(),
        }
    }
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            backend: AdvertiserKind::default(),
            name: default_service_name(),
            service_type: default_service_type(),
            domain: None,
            host: None,
            metadata: None,
            discovery_port: default_discovery_port(),
            service_dir: default_service_dir(),
        }
    }
}

impl ServerConfig {
    /// Converts the file settings into connection server options.
    pub fn options(&self) -> ServerOptions {
        ServerOptions {
            backlog: self.backlog,
            event_capacity: self.event_capacity,
            handshake: self.send_handshake.then(|| HANDSHAKE_FRAME.to_vec()),
        }
    }
}

impl AdvertiseConfig {
    /// The descriptor to publish for a relay listening on `port`.
    pub fn descriptor(&self, port: u16) -> ServiceDescriptor {
        ServiceDescriptor {
            name: self.name.clone(),
            service_type: self.service_type.clone(),
            domain: self.domain.clone(),
            host: self.host.clone(),
            metadata: self.metadata.clone(),
            port,
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Resolves the full path to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the platform config file, returning defaults if it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    let path = config_file_path()?;
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfig::default()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// Loads an explicitly named config file.  Unlike [`load_config`], a missing
/// file is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Resolves the platform config directory, including the `roomba-relay` leaf.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RoombaRelay"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("roomba-relay"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RoombaRelay")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_values() {
        // Arrange / Act
        let cfg = RelayConfig::default();

        // Assert
        assert_eq!(cfg.server.port, 1444);
        assert!(cfg.server.send_handshake);
        assert_eq!(cfg.server.event_capacity, 5);
        assert_eq!(cfg.server.backlog, 5);
        assert_eq!(cfg.advertise.backend, AdvertiserKind::Udp);
        assert_eq!(cfg.advertise.name, "Roomba Controller");
        assert_eq!(cfg.advertise.service_type, "_roomba._tcp");
        assert_eq!(cfg.advertise.discovery_port, 1445);
        assert_eq!(cfg.advertise.service_dir, PathBuf::from("/etc/avahi/services"));
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        // Arrange
        let text = r#"
            log_level = "debug"

            [server]
            port = 2000

            [advertise]
            backend = "file"
            metadata = "fleet=lab"
        "#;

        // Act
        let cfg: RelayConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.server.port, 2000);
        assert!(cfg.server.send_handshake);
        assert_eq!(cfg.advertise.backend, AdvertiserKind::File);
        assert_eq!(cfg.advertise.metadata.as_deref(), Some("fleet=lab"));
        assert_eq!(cfg.advertise.name, "Roomba Controller");
    }

    #[test]
    fn test_unknown_backend_in_toml_is_a_parse_error() {
        let result: Result<RelayConfig, _> = toml::from_str("[advertise]\nbackend = \"mdns\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_advertiser_kind_parses_case_insensitively() {
        assert_eq!("UDP".parse::<AdvertiserKind>().unwrap(), AdvertiserKind::Udp);
        assert_eq!("none".parse::<AdvertiserKind>().unwrap(), AdvertiserKind::None);
        assert!(matches!(
            "zeroconf".parse::<AdvertiserKind>(),
            Err(ConfigError::UnknownAdvertiser(_))
        ));
    }

    #[test]
    fn test_server_options_drop_handshake_when_disabled() {
        let mut server = ServerConfig::default();
        assert_eq!(server.options().handshake.as_deref(), Some(&HANDSHAKE_FRAME[..]));
        server.send_handshake = false;
        assert!(server.options().handshake.is_none());
    }

    #[test]
    fn test_descriptor_carries_port_and_optional_fields() {
        // Arrange
        let advertise = AdvertiseConfig {
            host: Some("relay.local".to_string()),
            ..AdvertiseConfig::default()
        };

        // Act
        let desc = advertise.descriptor(1444);

        // Assert
        assert_eq!(desc.port, 1444);
        assert_eq!(desc.name, "Roomba Controller");
        assert_eq!(desc.host.as_deref(), Some("relay.local"));
        assert!(desc.domain.is_none());
    }

    #[test]
    fn test_load_config_from_missing_path_is_io_error() {
        let result = load_config_from(Path::new("/definitely/not/here/relay.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_config_from_reads_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!(
            "roomba-relay-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[server]\nport = 4321\n").unwrap();

        // Act
        let cfg = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(cfg.server.port, 4321);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = RelayConfig::default();
        cfg.advertise.domain = Some("local".to_string());
        let text = toml::to_string_pretty(&cfg).unwrap();
        let restored: RelayConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg, restored);
    }
}
