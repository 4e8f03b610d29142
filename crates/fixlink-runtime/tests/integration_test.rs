//! Integration tests for the provider subscription.
//!
//! These tests run a real owning thread and a simulated platform that
//! delivers callbacks through the dispatcher, the way a platform event loop
//! would, while controller threads change providers concurrently.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use fixlink_runtime::{
    ChannelSink, ConnectionState, Dispatcher, Location, LocationListener, Looper,
    PositioningService, ProviderId, ProviderStatus, ProviderSubscription, ServiceError, SinkEvent,
    SubscriptionConfig, UpdatePolicy,
};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Default)]
struct PlatformState {
    /// Every request/remove in call order, with the calling thread's name.
    log: Vec<(String, Option<String>)>,
    registered: Option<(ProviderId, Arc<dyn LocationListener>)>,
    max_registrations: usize,
    fail_next_request: Option<ServiceError>,
    fail_next_remove: Option<ServiceError>,
}

/// Simulated platform location manager.
#[derive(Clone, Default)]
struct SimulatedPlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl SimulatedPlatform {
    fn requests(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(call, _)| call.starts_with("request"))
            .count()
    }

    fn removes(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(call, _)| call == "remove")
            .count()
    }

    /// Post a fix from the platform's event loop.
    fn post_fix(&self, dispatcher: &Dispatcher, location: Location) {
        let state = self.state.clone();
        dispatcher
            .submit(move || {
                let listener = state
                    .lock()
                    .unwrap()
                    .registered
                    .as_ref()
                    .map(|(_, l)| l.clone());
                if let Some(listener) = listener {
                    listener.on_location(location);
                }
                Ok(())
            })
            .unwrap();
    }

    fn post_status(&self, dispatcher: &Dispatcher, status: ProviderStatus) {
        let state = self.state.clone();
        dispatcher
            .submit(move || {
                let registered = state.lock().unwrap().registered.clone();
                if let Some((provider, listener)) = registered {
                    listener.on_status_changed(&provider, status);
                }
                Ok(())
            })
            .unwrap();
    }
}

impl PositioningService for SimulatedPlatform {
    fn request_updates(
        &mut self,
        provider: &ProviderId,
        policy: &UpdatePolicy,
        listener: Arc<dyn LocationListener>,
    ) -> Result<(), ServiceError> {
        assert_eq!(policy.min_interval_ms, 1000);
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.fail_next_request.take() {
            return Err(e);
        }
        state.log.push((
            format!("request {provider}"),
            thread::current().name().map(String::from),
        ));
        if state.registered.is_some() {
            state.max_registrations = 2;
        } else {
            state.max_registrations = state.max_registrations.max(1);
        }
        state.registered = Some((provider.clone(), listener));
        Ok(())
    }

    fn remove_updates(&mut self, listener: &Arc<dyn LocationListener>) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.fail_next_remove.take() {
            return Err(e);
        }
        state.log.push((
            "remove".to_string(),
            thread::current().name().map(String::from),
        ));
        if let Some((_, registered)) = &state.registered {
            assert!(Arc::ptr_eq(registered, listener));
        }
        state.registered = None;
        Ok(())
    }
}

fn start(
    name: &str,
    default_provider: Option<ProviderId>,
) -> (
    Dispatcher,
    thread::JoinHandle<Result<(), fixlink_runtime::Error>>,
    ProviderSubscription,
    SimulatedPlatform,
    UnboundedReceiver<SinkEvent>,
) {
    let (dispatcher, handle) = Looper::spawn(name).expect("spawn owning thread");
    let platform = SimulatedPlatform::default();
    let (sink, rx) = ChannelSink::new();
    let config = SubscriptionConfig {
        default_provider,
        ..Default::default()
    };
    let subscription = ProviderSubscription::new(&dispatcher, platform.clone(), sink, &config);
    (dispatcher, handle, subscription, platform, rx)
}

fn drain(rx: &mut UnboundedReceiver<SinkEvent>) -> Vec<SinkEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Block until the owning thread has processed everything queued so far.
fn sync(dispatcher: &Dispatcher) {
    let (tx, rx) = std::sync::mpsc::channel();
    dispatcher
        .submit(move || {
            tx.send(()).ok();
            Ok(())
        })
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5))
        .expect("owning thread did not respond");
}

#[test]
fn test_fix_reaches_consumer_thread() {
    let (dispatcher, handle, subscription, platform, mut rx) =
        start("fixlink-owner-fix", Some(ProviderId::gps()));

    platform.post_fix(&dispatcher, Location::new(100, 10.0, 50.0));

    let first = rx.blocking_recv().unwrap();
    let second = rx.blocking_recv().unwrap();
    let third = rx.blocking_recv().unwrap();
    assert_eq!(first.state(), Some(ConnectionState::Waiting));
    assert_eq!(second.state(), Some(ConnectionState::Fixed));
    let fix = third.fix().expect("Expected Fix");
    assert_eq!(fix.timestamp, 100);
    assert_eq!(fix.satellite_count, 1);
    assert_eq!((fix.longitude, fix.latitude), (10.0, 50.0));
    assert_eq!((fix.altitude, fix.bearing, fix.speed), (None, None, None));

    subscription.shutdown();
    dispatcher.quit().unwrap();
    handle.join().unwrap().unwrap();
}

#[test]
fn test_service_only_touched_on_owning_thread() {
    let (dispatcher, handle, subscription, platform, _rx) =
        start("fixlink-owner-affinity", Some(ProviderId::gps()));

    let controller = {
        let subscription = subscription.clone();
        thread::spawn(move || {
            subscription.set_provider(Some(ProviderId::network()));
            subscription.set_provider(None);
            subscription.set_provider(Some(ProviderId::gps()));
        })
    };
    controller.join().unwrap();

    subscription.shutdown();
    dispatcher.quit().unwrap();
    handle.join().unwrap().unwrap();

    let log = platform.state.lock().unwrap().log.clone();
    assert!(!log.is_empty());
    assert!(log
        .iter()
        .all(|(_, thread)| thread.as_deref() == Some("fixlink-owner-affinity")));
}

#[test]
fn test_concurrent_provider_changes_never_double_subscribe() {
    let (dispatcher, handle, subscription, platform, mut rx) =
        start("fixlink-owner-concurrent", None);

    let controllers: Vec<_> = (0..8)
        .map(|i| {
            let subscription = subscription.clone();
            thread::spawn(move || {
                for j in 0..50 {
                    let provider = match (i + j) % 3 {
                        0 => Some(ProviderId::gps()),
                        1 => Some(ProviderId::network()),
                        _ => None,
                    };
                    subscription.set_provider(provider);
                }
            })
        })
        .collect();
    for controller in controllers {
        controller.join().unwrap();
    }

    // converge on a known selection
    subscription.set_provider(Some(ProviderId::network()));
    sync(&dispatcher);

    {
        let state = platform.state.lock().unwrap();
        assert!(state.max_registrations <= 1);
        let (provider, _) = state.registered.as_ref().expect("subscribed");
        assert_eq!(provider, &ProviderId::network());
    }

    let events = drain(&mut rx);
    assert_eq!(
        events.last().and_then(SinkEvent::state),
        Some(ConnectionState::Waiting)
    );
    assert!(events.iter().all(|e| e.fix().is_none()));

    subscription.shutdown();
    dispatcher.quit().unwrap();
    handle.join().unwrap().unwrap();

    // every registration was removed again
    assert_eq!(platform.requests(), platform.removes());
    assert!(platform.state.lock().unwrap().registered.is_none());
}

#[test]
fn test_fixes_are_never_delivered_while_disconnected() {
    let (dispatcher, handle, subscription, platform, mut rx) =
        start("fixlink-owner-ordering", Some(ProviderId::gps()));

    for t in 0..20 {
        platform.post_fix(&dispatcher, Location::new(t, 10.0, 50.0));
        if t % 5 == 0 {
            platform.post_status(&dispatcher, ProviderStatus::TemporarilyUnavailable);
        }
        if t % 7 == 0 {
            platform.post_status(&dispatcher, ProviderStatus::Available);
        }
    }
    sync(&dispatcher);

    let mut state = ConnectionState::Disconnected;
    let mut fixes = 0;
    for event in drain(&mut rx) {
        match event {
            SinkEvent::Connection(msg) => state = msg.state,
            SinkEvent::Fix(_) => {
                assert_eq!(state, ConnectionState::Fixed);
                fixes += 1;
            }
        }
    }
    assert_eq!(fixes, 20);

    subscription.shutdown();
    dispatcher.quit().unwrap();
    handle.join().unwrap().unwrap();
}

#[test]
fn test_no_sink_calls_after_shutdown() {
    let (dispatcher, handle, subscription, platform, mut rx) =
        start("fixlink-owner-shutdown", Some(ProviderId::gps()));
    sync(&dispatcher);
    // keep the listener to simulate a late platform callback
    let listener = platform
        .state
        .lock()
        .unwrap()
        .registered
        .as_ref()
        .map(|(_, l)| l.clone())
        .expect("subscribed");

    subscription.shutdown();
    sync(&dispatcher);
    let before = drain(&mut rx);

    dispatcher
        .submit(move || {
            listener.on_location(Location::new(1, 10.0, 50.0));
            listener.on_provider_enabled(&ProviderId::gps());
            Ok(())
        })
        .unwrap();
    subscription.set_provider(Some(ProviderId::network()));
    sync(&dispatcher);

    assert_eq!(before.len(), 1);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(platform.requests(), 1);
    assert_eq!(platform.removes(), 1);

    dispatcher.quit().unwrap();
    handle.join().unwrap().unwrap();
}

#[test]
fn test_failed_unsubscribe_is_retried_on_shutdown() {
    let (dispatcher, handle, subscription, platform, mut rx) =
        start("fixlink-owner-remove-failure", Some(ProviderId::gps()));
    sync(&dispatcher);
    platform.state.lock().unwrap().fail_next_remove =
        Some(ServiceError::Unavailable("busy".to_string()));

    subscription.set_provider(Some(ProviderId::network()));
    sync(&dispatcher);
    // the old registration is still in place, nothing new was requested
    assert_eq!(platform.requests(), 1);
    assert_eq!(platform.removes(), 0);

    subscription.shutdown();
    dispatcher.quit().unwrap();
    let result = handle.join().unwrap();

    assert!(matches!(
        result,
        Err(fixlink_runtime::Error::Service(ServiceError::Unavailable(_)))
    ));
    assert_eq!(platform.removes(), 1);
    assert!(platform.state.lock().unwrap().registered.is_none());
    let states: Vec<_> = drain(&mut rx).iter().filter_map(SinkEvent::state).collect();
    assert_eq!(states, vec![ConnectionState::Waiting]);
}

#[test]
fn test_failed_subscribe_can_be_retried() {
    let (dispatcher, handle, subscription, platform, mut rx) =
        start("fixlink-owner-request-failure", None);
    sync(&dispatcher);
    platform.state.lock().unwrap().fail_next_request =
        Some(ServiceError::PermissionDenied("ACCESS_FINE_LOCATION".to_string()));

    subscription.set_provider(Some(ProviderId::gps()));
    sync(&dispatcher);
    assert_eq!(platform.requests(), 0);
    assert!(!handle.is_finished());

    subscription.set_provider(Some(ProviderId::gps()));
    sync(&dispatcher);
    assert_eq!(platform.requests(), 1);
    assert_eq!(
        drain(&mut rx).last().and_then(SinkEvent::state),
        Some(ConnectionState::Waiting)
    );

    subscription.shutdown();
    dispatcher.quit().unwrap();
    let result = handle.join().unwrap();

    assert!(matches!(
        result,
        Err(fixlink_runtime::Error::Service(ServiceError::PermissionDenied(_)))
    ));
    assert_eq!(platform.removes(), 1);
}
