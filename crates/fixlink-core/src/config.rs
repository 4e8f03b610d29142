//! Subscription configuration.
//!
//! The configuration is plain serde data so each host can keep it wherever
//! it keeps its settings. A JSON file loader is provided for hosts that
//! don't have their own.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::model::{ProviderId, ProviderSelection};

/// Minimum time between updates requested from the positioning service.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Read error: {0}")]
    ReadError(#[from] std::io::Error),

    /// Configuration data is invalid.
    #[error("Invalid data: {0}")]
    InvalidData(#[from] serde_json::Error),
}

/// Update-rate policy passed to the positioning service on subscribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePolicy {
    /// Minimum time between updates, in milliseconds.
    pub min_interval_ms: u64,
    /// Minimum distance between updates, in meters. Zero means time-based only.
    pub min_distance_m: f32,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            min_distance_m: 0.0,
        }
    }
}

/// Configuration for a provider subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionConfig {
    /// Provider selected when the subscription is created.
    pub default_provider: ProviderSelection,

    pub update_policy: UpdatePolicy,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            default_provider: Some(ProviderId::gps()),
            update_policy: UpdatePolicy::default(),
        }
    }
}

impl SubscriptionConfig {
    /// Parse configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
