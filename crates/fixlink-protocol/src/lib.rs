//! # fixlink-protocol
//!
//! Event types crossing the sink boundary and their JSON codec.
//!
//! Consumers that run on another thread (or in another process) receive the
//! subscription's history as a stream of [`SinkEvent`]s.

pub mod codec;
pub mod messages;

pub use codec::*;
pub use messages::*;
