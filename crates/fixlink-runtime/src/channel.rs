//! Sink that forwards events to another thread.

use fixlink_core::{ConnectionState, FixReport, Sink};
use fixlink_protocol::SinkEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// A [`Sink`] pushing [`SinkEvent`]s onto an unbounded channel.
///
/// Sending never blocks the owning thread. Once the receiver is gone events
/// are discarded; this is logged once and never reported back.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
    receiver_gone: bool,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            receiver_gone: false,
        };
        (sink, rx)
    }

    fn forward(&mut self, event: SinkEvent) {
        if self.tx.send(event).is_err() && !self.receiver_gone {
            warn!("sink receiver dropped, discarding events");
            self.receiver_gone = true;
        }
    }
}

impl Sink for ChannelSink {
    fn report_connection(&mut self, state: ConnectionState) {
        self.forward(SinkEvent::connection(state));
    }

    fn report_fix(&mut self, report: &FixReport) {
        self.forward(SinkEvent::Fix(*report));
    }
}
