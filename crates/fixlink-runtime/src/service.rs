//! Positioning service contract.
//!
//! The platform side is modelled after a classic location manager: a
//! listener is registered for one provider with an update policy and
//! removed again by identity. Implementations must invoke listener methods
//! on the owning thread only.

use std::sync::Arc;

use fixlink_core::{Location, ProviderId, ProviderStatus, UpdatePolicy};
use thiserror::Error;

/// Errors a positioning service can return from subscribe/unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The provider does not exist on this device.
    #[error("Unknown provider: {0}")]
    UnknownProvider(ProviderId),

    /// The application may not use location services.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The service could not process the request.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Callbacks from a positioning service.
pub trait LocationListener: Send + Sync {
    /// A new observation is available.
    fn on_location(&self, location: Location);

    fn on_provider_enabled(&self, provider: &ProviderId);

    fn on_provider_disabled(&self, provider: &ProviderId);

    fn on_status_changed(&self, provider: &ProviderId, status: ProviderStatus);
}

/// A platform positioning service.
///
/// Both methods are only ever called on the owning thread.
pub trait PositioningService: Send {
    /// Register `listener` for updates from `provider`.
    fn request_updates(
        &mut self,
        provider: &ProviderId,
        policy: &UpdatePolicy,
        listener: Arc<dyn LocationListener>,
    ) -> Result<(), ServiceError>;

    /// Remove every registration of `listener`.
    fn remove_updates(&mut self, listener: &Arc<dyn LocationListener>) -> Result<(), ServiceError>;
}
