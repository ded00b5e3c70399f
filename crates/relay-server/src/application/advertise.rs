//! Service advertisement port and the publish/withdraw use case.
//!
//! An advertiser makes the relay discoverable on the LAN.  Backends live in
//! `infrastructure::advertise`; this module only knows the trait.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use relay_core::{AdvertisementId, ServiceDescriptor};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised by service advertisers.
#[derive(Debug, Error)]
pub enum AdvertiseError {
    #[error("advertiser not initialized")]
    NotInitialized,

    #[error("advertiser already initialized")]
    AlreadyInitialized,

    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("service directory {0} does not exist or is not a directory")]
    ServiceDir(PathBuf),

    #[error("unknown advertisement {0}")]
    UnknownService(AdvertisementId),

    #[error("failed to spawn advertiser thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("invalid service descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Publishes service descriptors on the local network.
///
/// Lifecycle: [`initialize`](Self::initialize) once, then any number of
/// [`add_service`](Self::add_service) / [`remove_service`](Self::remove_service)
/// calls, then [`shutdown`](Self::shutdown).  Ids are only meaningful to the
/// instance that issued them.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceAdvertiser: Send {
    /// Acquires the backend's resources (socket, directory, daemon session).
    fn initialize(&mut self) -> Result<(), AdvertiseError>;

    /// Withdraws every published service and releases the backend.
    fn shutdown(&mut self);

    /// Publishes a copy of `service`.
    fn add_service(&mut self, service: &ServiceDescriptor)
        -> Result<AdvertisementId, AdvertiseError>;

    /// Withdraws one service previously returned by `add_service`.
    fn remove_service(&mut self, id: AdvertisementId) -> Result<(), AdvertiseError>;

    /// Short backend name for log lines.
    fn backend_name(&self) -> &'static str;
}

/// Initializes `advertiser` and publishes `service`.
///
/// Returns the advertisement id, or `None` if either step failed.  Failures
/// are logged; the relay keeps running without advertisement.
pub fn advertise_relay(
    advertiser: &mut dyn ServiceAdvertiser,
    service: &ServiceDescriptor,
) -> Option<AdvertisementId> {
    let backend = advertiser.backend_name();
    if let Err(e) = advertiser.initialize() {
        warn!(backend, "advertiser unavailable, continuing without it: {e}");
        return None;
    }
    match advertiser.add_service(service) {
        Ok(id) => {
            info!(
                backend,
                name = %service.name,
                service_type = %service.service_type,
                port = service.port,
                "relay advertised"
            );
            Some(id)
        }
        Err(e) => {
            warn!(backend, "failed to advertise relay: {e}");
            advertiser.shutdown();
            None
        }
    }
}

/// Withdraws the advertisement (if any) and shuts the advertiser down.
pub fn withdraw_relay(advertiser: &mut dyn ServiceAdvertiser, id: Option<AdvertisementId>) {
    if let Some(id) = id {
        if let Err(e) = advertiser.remove_service(id) {
            warn!(backend = advertiser.backend_name(), "failed to withdraw {id}: {e}");
        }
    }
    advertiser.shutdown();
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn relay_descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new("Roomba Controller", "_roomba._tcp", 1444)
    }

    #[test]
    fn test_advertise_relay_returns_id_on_success() {
        // Arrange
        let id = AdvertisementId::new();
        let mut mock = MockServiceAdvertiser::new();
        mock.expect_backend_name().return_const("mock");
        mock.expect_initialize().times(1).returning(|| Ok(()));
        mock.expect_add_service()
            .with(eq(relay_descriptor()))
            .times(1)
            .returning(move |_| Ok(id));

        // Act
        let result = advertise_relay(&mut mock, &relay_descriptor());

        // Assert
        assert_eq!(result, Some(id));
    }

    #[test]
    fn test_advertise_relay_skips_add_when_initialize_fails() {
        // Arrange
        let mut mock = MockServiceAdvertiser::new();
        mock.expect_backend_name().return_const("mock");
        mock.expect_initialize()
            .returning(|| Err(AdvertiseError::ServiceDir(PathBuf::from("/nope"))));
        mock.expect_add_service().never();

        // Act
        let result = advertise_relay(&mut mock, &relay_descriptor());

        // Assert
        assert!(result.is_none());
    }

    #[test]
    fn test_advertise_relay_shuts_down_when_add_fails() {
        // Arrange
        let mut mock = MockServiceAdvertiser::new();
        mock.expect_backend_name().return_const("mock");
        mock.expect_initialize().returning(|| Ok(()));
        mock.expect_add_service()
            .returning(|_| Err(AdvertiseError::InvalidDescriptor("empty name".into())));
        mock.expect_shutdown().times(1).return_const(());

        // Act
        let result = advertise_relay(&mut mock, &relay_descriptor());

        // Assert
        assert!(result.is_none());
    }

    #[test]
    fn test_withdraw_relay_removes_then_shuts_down() {
        // Arrange
        let id = AdvertisementId::new();
        let mut seq = mockall::Sequence::new();
        let mut mock = MockServiceAdvertiser::new();
        mock.expect_remove_service()
            .with(eq(id))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_shutdown()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        // Act / Assert (expectations verified on drop)
        withdraw_relay(&mut mock, Some(id));
    }

    #[test]
    fn test_withdraw_relay_without_id_only_shuts_down() {
        let mut mock = MockServiceAdvertiser::new();
        mock.expect_remove_service().never();
        mock.expect_shutdown().times(1).return_const(());
        withdraw_relay(&mut mock, None);
    }

    #[test]
    fn test_withdraw_relay_still_shuts_down_when_remove_fails() {
        // Arrange
        let id = AdvertisementId::new();
        let mut mock = MockServiceAdvertiser::new();
        mock.expect_backend_name().return_const("mock");
        mock.expect_remove_service()
            .returning(|id| Err(AdvertiseError::UnknownService(id)));
        mock.expect_shutdown().times(1).return_const(());

        // Act / Assert
        withdraw_relay(&mut mock, Some(id));
    }
}
