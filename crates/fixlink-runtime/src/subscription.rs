//! Provider subscription management.
//!
//! [`ProviderSubscription`] owns the one registration this process holds
//! with the positioning service. Provider changes may be requested from any
//! thread; they are recorded as the pending selection and applied on the
//! owning thread, where the service's callbacks also arrive.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};

use fixlink_core::{
    ConnectionState, FixReport, Location, ProviderId, ProviderSelection, ProviderStatus, Sink,
    StateEvent, SubscriptionConfig, UpdatePolicy,
};
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::service::{LocationListener, PositioningService, ServiceError};

/// A callback from the positioning service, as data.
#[derive(Debug, Clone, Copy)]
enum ListenerEvent {
    Fix(Location),
    ProviderEnabled,
    ProviderDisabled,
    StatusChanged(ProviderStatus),
}

/// State written by any thread.
#[derive(Debug, Default)]
struct Pending {
    selection: ProviderSelection,
    /// An apply is queued and has not read `selection` yet.
    apply_queued: bool,
    shut_down: bool,
}

/// State only touched on the owning thread.
struct Owned {
    service: Box<dyn PositioningService>,
    sink: Box<dyn Sink>,
    listener: Arc<dyn LocationListener>,
    /// Provider currently registered with the service.
    active: Option<ProviderId>,
    connection: ConnectionState,
    closed: bool,
}

impl Owned {
    /// Call into the sink. A panicking sink is logged and otherwise ignored.
    fn notify(&mut self, what: &'static str, call: impl FnOnce(&mut dyn Sink)) {
        let sink = &mut *self.sink;
        if panic::catch_unwind(AssertUnwindSafe(|| call(sink))).is_err() {
            error!("sink panicked in {}", what);
        }
    }

    fn transition(&mut self, event: StateEvent) {
        let Some(next) = self.connection.next(event) else {
            debug!(?event, state = %self.connection, "no connection state change");
            return;
        };
        debug!(from = %self.connection, to = %next, ?event, "connection state");
        self.connection = next;
        self.notify("report_connection", |sink| sink.report_connection(next));
    }

    fn handle(&mut self, event: ListenerEvent) {
        if self.closed {
            debug!(?event, "subscription closed, ignoring callback");
            return;
        }

        match event {
            ListenerEvent::Fix(location) => match FixReport::try_from(location) {
                Ok(report) => {
                    self.transition(StateEvent::FixReceived);
                    self.notify("report_fix", |sink| sink.report_fix(&report));
                }
                Err(e) => warn!("dropping invalid fix: {}", e),
            },
            ListenerEvent::ProviderEnabled => self.transition(StateEvent::ProviderEnabled),
            ListenerEvent::ProviderDisabled => self.transition(StateEvent::ProviderDisabled),
            ListenerEvent::StatusChanged(status) => {
                self.transition(StateEvent::StatusChanged(status))
            }
        }
    }

    /// Remove the active registration, if any.
    ///
    /// On failure the registration stays recorded so a later apply or
    /// shutdown retries it.
    fn unsubscribe(&mut self) -> Result<(), ServiceError> {
        let Some(provider) = self.active.take() else {
            return Ok(());
        };
        if let Err(e) = self.service.remove_updates(&self.listener) {
            error!(%provider, "failed to remove location updates: {}", e);
            self.active = Some(provider);
            return Err(e);
        }
        info!(%provider, "location updates removed");
        Ok(())
    }
}

struct Shared {
    dispatcher: Dispatcher,
    policy: UpdatePolicy,
    pending: Mutex<Pending>,
    owned: Mutex<Owned>,
    /// Callbacks raised while `owned` was held by a service call.
    deferred: Mutex<VecDeque<ListenerEvent>>,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_owned(&self) -> MutexGuard<'_, Owned> {
        self.owned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_deferred(&self) -> MutexGuard<'_, VecDeque<ListenerEvent>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle callbacks deferred during the last service call, in order.
    fn drain_deferred(&self, owned: &mut Owned) {
        loop {
            let next = self.lock_deferred().pop_front();
            let Some(event) = next else {
                return;
            };
            owned.handle(event);
        }
    }

    /// Queue an apply unless one is already queued; the queued one will
    /// read the latest selection anyway.
    fn request_apply(self: &Arc<Self>) {
        {
            let mut pending = self.lock_pending();
            // a closed dispatcher dropped whatever apply was queued
            if pending.apply_queued && !self.dispatcher.is_closed() {
                debug!("provider change coalesced with queued apply");
                return;
            }
            pending.apply_queued = true;
        }

        let shared = Arc::clone(self);
        if let Err(e) = self.dispatcher.submit(move || shared.apply_pending()) {
            warn!("cannot queue provider change: {}", e);
            self.lock_pending().apply_queued = false;
        }
    }

    fn apply_pending(&self) -> Result<(), Error> {
        self.dispatcher.assert_owning_thread("apply_pending");

        let selection = {
            let mut pending = self.lock_pending();
            pending.apply_queued = false;
            pending.selection.clone()
        };

        let mut owned = self.lock_owned();
        if owned.closed {
            debug!("subscription closed, ignoring provider change");
            return Ok(());
        }

        // always re-issued, also when the provider did not change
        let unsubscribed = owned.unsubscribe();
        // callbacks for the old registration land before the new one starts
        self.drain_deferred(&mut owned);
        unsubscribed?;

        let Some(provider) = selection else {
            owned.transition(StateEvent::Unsubscribed);
            self.drain_deferred(&mut owned);
            return Ok(());
        };

        let listener = Arc::clone(&owned.listener);
        let requested = owned
            .service
            .request_updates(&provider, &self.policy, listener);
        let result = match requested {
            Ok(()) => {
                info!(
                    %provider,
                    min_interval_ms = self.policy.min_interval_ms,
                    min_distance_m = self.policy.min_distance_m,
                    "location updates requested"
                );
                owned.active = Some(provider);
                owned.transition(StateEvent::Subscribed);
                Ok(())
            }
            Err(ServiceError::UnknownProvider(provider)) => {
                warn!(%provider, "unknown location provider");
                owned.transition(StateEvent::Unsubscribed);
                Ok(())
            }
            Err(e) => {
                error!(%provider, "failed to request location updates: {}", e);
                owned.transition(StateEvent::Unsubscribed);
                Err(e.into())
            }
        };
        self.drain_deferred(&mut owned);
        result
    }

    fn teardown(&self) -> Result<(), Error> {
        self.dispatcher.assert_owning_thread("shutdown");

        let mut owned = self.lock_owned();
        if owned.closed {
            return Ok(());
        }
        owned.closed = true;
        let unsubscribed = owned.unsubscribe();
        self.drain_deferred(&mut owned);
        unsubscribed?;
        info!("location subscription shut down");
        Ok(())
    }

    fn deliver(&self, event: ListenerEvent) {
        self.dispatcher.assert_owning_thread("location callback");

        let mut owned = match self.owned.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                // called back from inside a service or sink call; the holder
                // of the lock handles it once that call returns
                debug!(?event, "deferring re-entrant callback");
                self.lock_deferred().push_back(event);
                return;
            }
        };

        owned.handle(event);
        self.drain_deferred(&mut owned);
    }
}

/// Listener registered with the positioning service on the subscription's
/// behalf.
struct SubscriptionListener {
    shared: Weak<Shared>,
}

impl SubscriptionListener {
    fn dispatch(&self, event: ListenerEvent) {
        if let Some(shared) = self.shared.upgrade() {
            shared.deliver(event);
        }
    }
}

impl LocationListener for SubscriptionListener {
    fn on_location(&self, location: Location) {
        self.dispatch(ListenerEvent::Fix(location));
    }

    fn on_provider_enabled(&self, provider: &ProviderId) {
        debug!(%provider, "provider enabled");
        self.dispatch(ListenerEvent::ProviderEnabled);
    }

    fn on_provider_disabled(&self, provider: &ProviderId) {
        debug!(%provider, "provider disabled");
        self.dispatch(ListenerEvent::ProviderDisabled);
    }

    fn on_status_changed(&self, provider: &ProviderId, status: ProviderStatus) {
        debug!(%provider, ?status, "provider status changed");
        self.dispatch(ListenerEvent::StatusChanged(status));
    }
}

/// The process-wide location subscription.
///
/// Cheap to clone; clones share the same subscription. `set_provider` and
/// `shutdown` may be called from any thread, everything else only on the
/// dispatcher's owning thread.
#[derive(Clone)]
pub struct ProviderSubscription {
    shared: Arc<Shared>,
}

impl ProviderSubscription {
    /// Create the subscription and queue the initial apply of
    /// `config.default_provider`.
    pub fn new<P, S>(
        dispatcher: &Dispatcher,
        service: P,
        sink: S,
        config: &SubscriptionConfig,
    ) -> Self
    where
        P: PositioningService + 'static,
        S: Sink + 'static,
    {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let listener: Arc<dyn LocationListener> = Arc::new(SubscriptionListener {
                shared: weak.clone(),
            });
            Shared {
                dispatcher: dispatcher.clone(),
                policy: config.update_policy.clone(),
                pending: Mutex::new(Pending {
                    selection: config.default_provider.clone(),
                    ..Pending::default()
                }),
                owned: Mutex::new(Owned {
                    service: Box::new(service),
                    sink: Box::new(sink),
                    listener,
                    active: None,
                    connection: ConnectionState::Disconnected,
                    closed: false,
                }),
                deferred: Mutex::new(VecDeque::new()),
            }
        });

        shared.request_apply();
        Self { shared }
    }

    /// Select the provider to use, or `None` to stop receiving fixes.
    ///
    /// Callable from any thread; returns immediately. Only the latest
    /// selection is applied.
    pub fn set_provider(&self, provider: ProviderSelection) {
        {
            let mut pending = self.shared.lock_pending();
            if pending.shut_down {
                warn!(?provider, "subscription shut down, ignoring provider change");
                return;
            }
            debug!(?provider, "provider change requested");
            pending.selection = provider;
        }
        self.shared.request_apply();
    }

    /// Apply the pending selection now: unsubscribe, then subscribe to the
    /// selected provider.
    ///
    /// Owning thread only.
    pub fn apply_pending(&self) -> Result<(), Error> {
        self.shared.apply_pending()
    }

    /// Owning thread only.
    pub fn on_fix(&self, location: Location) {
        self.shared.deliver(ListenerEvent::Fix(location));
    }

    /// Owning thread only.
    pub fn on_provider_enabled(&self) {
        self.shared.deliver(ListenerEvent::ProviderEnabled);
    }

    /// Owning thread only.
    pub fn on_provider_disabled(&self) {
        self.shared.deliver(ListenerEvent::ProviderDisabled);
    }

    /// Owning thread only.
    pub fn on_status_changed(&self, status: ProviderStatus) {
        self.shared.deliver(ListenerEvent::StatusChanged(status));
    }

    /// Shut the subscription down.
    ///
    /// Callable from any thread. Provider changes already queued are applied
    /// first, then the active registration (if any) is removed exactly once.
    /// No sink calls happen afterwards and later provider changes are
    /// ignored.
    pub fn shutdown(&self) {
        {
            let mut pending = self.shared.lock_pending();
            if pending.shut_down {
                return;
            }
            pending.shut_down = true;
        }

        let shared = Arc::clone(&self.shared);
        if let Err(e) = self.shared.dispatcher.submit(move || shared.teardown()) {
            warn!("cannot queue shutdown: {}", e);
        }
    }
}

impl std::fmt::Debug for ProviderSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSubscription")
            .field("owner", &self.shared.dispatcher.owner())
            .field("policy", &self.shared.policy)
            .finish_non_exhaustive()
    }
}
