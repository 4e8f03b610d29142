//! The boundary a subscription reports into.

use crate::model::{ConnectionState, FixReport};

/// Consumer-owned receiver of connection-state changes and fixes.
///
/// Both methods are called synchronously on the owning thread, in the order
/// the events happened. Implementations must return quickly and must handle
/// their own failures: nothing a sink does is propagated back into the
/// subscription.
///
/// A panic inside either method is caught and logged by the subscription;
/// the event is lost for this sink but the connection state and the
/// registration are unaffected. Sinks that share state across a panic
/// should not rely on it being consistent afterwards.
pub trait Sink: Send {
    /// Called on every connection-state transition.
    fn report_connection(&mut self, state: ConnectionState);

    /// Called for every fix, always after `report_connection(Fixed)`.
    fn report_fix(&mut self, report: &FixReport);
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn report_connection(&mut self, state: ConnectionState) {
        (**self).report_connection(state);
    }

    fn report_fix(&mut self, report: &FixReport) {
        (**self).report_fix(report);
    }
}
