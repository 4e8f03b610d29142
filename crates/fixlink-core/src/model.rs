//! fixlink data model types.
//!
//! These types represent what flows through a location subscription:
//! - Raw observations delivered by a positioning service (`Location`)
//! - Validated, immutable fixes handed to the consumer (`FixReport`)
//! - The connection state machine (`ConnectionState`) and its inputs
//! - Provider identifiers and platform status codes

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Satellite count reported when the producer supplies none.
pub const DEFAULT_SATELLITE_COUNT: u32 = 1;

/// Identifier naming which positioning source to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Satellite receiver provider.
    pub const GPS: &'static str = "gps";
    /// Cell/WiFi based provider.
    pub const NETWORK: &'static str = "network";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn gps() -> Self {
        Self::new(Self::GPS)
    }

    pub fn network() -> Self {
        Self::new(Self::NETWORK)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ProviderId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The provider the subscription should use, or `None` for "no provider".
pub type ProviderSelection = Option<ProviderId>;

/// A raw observation as delivered by a positioning service.
///
/// Optional quantities are `None` when the producer did not measure them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Producer-supplied fix time, passed through untouched.
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellite_count: Option<u32>,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl Location {
    /// Create a 2D observation with no optional quantities.
    pub fn new(time: i64, longitude: f64, latitude: f64) -> Self {
        Self {
            time,
            satellite_count: None,
            longitude,
            latitude,
            altitude: None,
            bearing: None,
            speed: None,
        }
    }

    pub fn with_satellites(mut self, count: u32) -> Self {
        self.satellite_count = Some(count);
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }
}

/// Errors raised while validating a raw observation.
#[derive(Debug, Error, PartialEq)]
pub enum FixError {
    #[error("latitude is not finite: {0}")]
    InvalidLatitude(f64),

    #[error("longitude is not finite: {0}")]
    InvalidLongitude(f64),
}

/// Immutable snapshot of one position observation, as handed to a [`crate::Sink`].
///
/// An absent optional quantity is `None`; there is no value to misread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixReport {
    /// Producer-supplied fix time (opaque epoch value).
    pub timestamp: i64,
    pub satellite_count: u32,
    /// Degrees.
    pub longitude: f64,
    /// Degrees.
    pub latitude: f64,
    pub altitude: Option<f64>,
    /// Degrees.
    pub bearing: Option<f64>,
    pub speed: Option<f64>,
}

impl TryFrom<Location> for FixReport {
    type Error = FixError;

    /// Validate a raw observation.
    ///
    /// Coordinates must be finite. A missing satellite count becomes
    /// [`DEFAULT_SATELLITE_COUNT`]; a non-finite optional quantity is dropped.
    fn try_from(location: Location) -> Result<Self, Self::Error> {
        if !location.latitude.is_finite() {
            return Err(FixError::InvalidLatitude(location.latitude));
        }
        if !location.longitude.is_finite() {
            return Err(FixError::InvalidLongitude(location.longitude));
        }

        Ok(Self {
            timestamp: location.time,
            satellite_count: location
                .satellite_count
                .unwrap_or(DEFAULT_SATELLITE_COUNT),
            longitude: location.longitude,
            latitude: location.latitude,
            altitude: location.altitude.filter(|v| v.is_finite()),
            bearing: location.bearing.filter(|v| v.is_finite()),
            speed: location.speed.filter(|v| v.is_finite()),
        })
    }
}

/// Status codes a positioning service reports for its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderStatus {
    OutOfService,
    TemporarilyUnavailable,
    Available,
}

impl ProviderStatus {
    /// Map a legacy platform status code (0, 1, 2).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::OutOfService),
            1 => Some(Self::TemporarilyUnavailable),
            2 => Some(Self::Available),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::OutOfService => 0,
            Self::TemporarilyUnavailable => 1,
            Self::Available => 2,
        }
    }
}

/// Connection status of the location subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No active subscription, or the provider is unavailable.
    #[default]
    Disconnected,
    /// Subscribed, no fix received yet.
    Waiting,
    /// At least one fix received since entering `Waiting`.
    Fixed,
}

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// A provider subscription was issued.
    Subscribed,
    /// The selection was applied with no provider, or subscribing failed.
    Unsubscribed,
    FixReceived,
    ProviderEnabled,
    ProviderDisabled,
    StatusChanged(ProviderStatus),
}

impl ConnectionState {
    /// Integer code used across the native boundary.
    pub fn code(self) -> i32 {
        match self {
            Self::Disconnected => 0,
            Self::Waiting => 1,
            Self::Fixed => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Waiting),
            2 => Some(Self::Fixed),
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self != Self::Disconnected
    }

    /// Target state for `event`, or `None` when the event causes no transition.
    ///
    /// Transitions do not depend on the current state and a target equal to
    /// the current state is still a transition: every fix yields `Fixed`.
    pub fn next(self, event: StateEvent) -> Option<Self> {
        match event {
            StateEvent::Subscribed | StateEvent::ProviderEnabled => Some(Self::Waiting),
            StateEvent::FixReceived => Some(Self::Fixed),
            StateEvent::Unsubscribed | StateEvent::ProviderDisabled => Some(Self::Disconnected),
            StateEvent::StatusChanged(
                ProviderStatus::OutOfService | ProviderStatus::TemporarilyUnavailable,
            ) => Some(Self::Disconnected),
            // "available" alone does not imply an active subscription
            StateEvent::StatusChanged(ProviderStatus::Available) => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Fixed => write!(f, "Fixed"),
        }
    }
}
