//! # fixlink-runtime
//!
//! Thread-affine location subscription.
//!
//! - [`Looper`] / [`Dispatcher`]: the single owning thread and the handle
//!   that marshals work onto it
//! - [`PositioningService`] / [`LocationListener`]: the platform positioning
//!   service contract
//! - [`ProviderSubscription`]: owns the subscription and reports into a
//!   [`fixlink_core::Sink`]
//! - [`ChannelSink`]: a sink that forwards events to another thread

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod service;
pub mod subscription;

pub use channel::ChannelSink;
pub use dispatcher::{Dispatcher, Looper};
pub use error::Error;
pub use service::{LocationListener, PositioningService, ServiceError};
pub use subscription::ProviderSubscription;

pub use fixlink_core::{
    ConnectionState, FixReport, Location, ProviderId, ProviderStatus, Sink, SubscriptionConfig,
    UpdatePolicy,
};
pub use fixlink_protocol::SinkEvent;
