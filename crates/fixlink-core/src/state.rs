//! Consumer-side GPS state.
//!
//! [`SharedGpsState`] is a ready-made [`Sink`] for consumers that only need
//! "what is the latest position and are we connected": the subscription
//! writes into it on the owning thread and any other thread reads a
//! snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{ConnectionState, FixReport};
use crate::sink::Sink;

/// Snapshot of what the consumer knows about the receiver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsState {
    pub connection: ConnectionState,
    /// Most recent fix. Kept across disconnects so the last known position
    /// stays available.
    pub last_fix: Option<FixReport>,
    /// Number of fixes received since creation.
    pub fix_count: u64,
}

impl GpsState {
    /// True when the receiver currently has a fix.
    pub fn has_fix(&self) -> bool {
        self.connection == ConnectionState::Fixed && self.last_fix.is_some()
    }
}

/// Thread-safe [`GpsState`] that doubles as a [`Sink`].
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct SharedGpsState {
    inner: Arc<RwLock<GpsState>>,
}

impl SharedGpsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> GpsState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connection
    }

    /// Latest position as `(latitude, longitude)`, if any fix was received.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_fix
            .map(|fix| (fix.latitude, fix.longitude))
    }
}

impl Sink for SharedGpsState {
    fn report_connection(&mut self, state: ConnectionState) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .connection = state;
    }

    fn report_fix(&mut self, report: &FixReport) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.last_fix = Some(*report);
        state.fix_count += 1;
    }
}
