//! Runtime error type.

use thiserror::Error;

use crate::service::ServiceError;

/// Errors returned by owning-thread work.
#[derive(Debug, Error)]
pub enum Error {
    /// A subscribe or unsubscribe call on the positioning service failed.
    #[error("Positioning service error: {0}")]
    Service(#[from] ServiceError),

    /// The owning thread's looper has stopped; nothing can be queued.
    #[error("Dispatcher closed")]
    DispatcherClosed,
}
