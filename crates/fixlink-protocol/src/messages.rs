//! Event types forwarded to a downstream consumer.
//!
//! A subscription's sink history is a linear sequence of:
//! - Connection: the connection state changed
//! - Fix: a new fix, always preceded by a `Fixed` connection event
//!
//! Events serialize as JSON objects tagged by `type`.
//!
//! # Example
//! ```json
//! {"type":"connection","state":"fixed","code":2}
//! {"type":"fix","timestamp":100,"satelliteCount":1,"longitude":10.0,"latitude":50.0,
//!  "altitude":null,"bearing":null,"speed":null}
//! ```

use fixlink_core::{ConnectionState, FixReport};
use serde::{Deserialize, Serialize};

/// Connection-state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMessage {
    pub state: ConnectionState,
    /// Legacy integer code of `state` (0, 1, 2).
    pub code: i32,
}

impl ConnectionMessage {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            code: state.code(),
        }
    }
}

/// One sink call, as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkEvent {
    Connection(ConnectionMessage),
    Fix(FixReport),
}

impl SinkEvent {
    pub fn connection(state: ConnectionState) -> Self {
        Self::Connection(ConnectionMessage::new(state))
    }

    /// The connection state carried by this event, if it is a connection event.
    pub fn state(&self) -> Option<ConnectionState> {
        match self {
            Self::Connection(msg) => Some(msg.state),
            Self::Fix(_) => None,
        }
    }

    pub fn fix(&self) -> Option<&FixReport> {
        match self {
            Self::Fix(report) => Some(report),
            Self::Connection(_) => None,
        }
    }
}

impl From<FixReport> for SinkEvent {
    fn from(report: FixReport) -> Self {
        Self::Fix(report)
    }
}
