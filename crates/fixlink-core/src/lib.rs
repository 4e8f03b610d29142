//! # fixlink-core
//!
//! Core data model for the fixlink location-subscription manager.
//!
//! This crate provides:
//! - Data model types (FixReport, Location, ConnectionState, ProviderId, etc.)
//! - Subscription configuration
//! - The `Sink` contract the subscription reports into
//! - A consumer-side state sink (`SharedGpsState`)
//!
//! This crate is intentionally runtime-agnostic and contains no async code
//! and spawns no threads, so it can be linked into any host application.

pub mod config;
pub mod model;
pub mod sink;
pub mod state;

pub use config::{ConfigError, SubscriptionConfig, UpdatePolicy};
pub use model::*;
pub use sink::Sink;
pub use state::{GpsState, SharedGpsState};
