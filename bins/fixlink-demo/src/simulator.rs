//! Simulated positioning service.
//!
//! Produces a slowly moving track. Ticks are generated on the tokio runtime
//! and marshaled onto the owning thread before the listener is called, which
//! is what a platform event loop does for its own callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fixlink_core::{Location, ProviderId, ProviderStatus, UpdatePolicy};
use fixlink_runtime::{Dispatcher, LocationListener, PositioningService, ServiceError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Time the satellite receiver needs before its first fix.
const GPS_TIME_TO_FIX: Duration = Duration::from_secs(2);

pub struct SimulatedReceiver {
    runtime: Handle,
    dispatcher: Dispatcher,
    updates: Option<Updates>,
}

struct Updates {
    task: JoinHandle<()>,
    /// Cleared on removal; ticks already queued on the owning thread check it.
    registered: Arc<AtomicBool>,
}

impl SimulatedReceiver {
    pub fn new(runtime: Handle, dispatcher: Dispatcher) -> Self {
        Self {
            runtime,
            dispatcher,
            updates: None,
        }
    }
}

impl PositioningService for SimulatedReceiver {
    fn request_updates(
        &mut self,
        provider: &ProviderId,
        policy: &UpdatePolicy,
        listener: Arc<dyn LocationListener>,
    ) -> Result<(), ServiceError> {
        let satellite = match provider.as_str() {
            ProviderId::GPS => true,
            ProviderId::NETWORK => false,
            _ => return Err(ServiceError::UnknownProvider(provider.clone())),
        };

        let provider = provider.clone();
        let period = Duration::from_millis(policy.min_interval_ms.max(1));
        let dispatcher = self.dispatcher.clone();
        let registered = Arc::new(AtomicBool::new(true));
        let still_registered = registered.clone();

        let task = self.runtime.spawn(async move {
            if satellite {
                tokio::time::sleep(GPS_TIME_TO_FIX).await;
            }
            let mut interval = tokio::time::interval(period);
            let mut latitude = 52.0987654;
            let mut longitude = 4.9876545;

            for tick in 0u64.. {
                interval.tick().await;
                latitude += 0.00001;
                longitude += 0.00002;

                let mut location = Location::new(
                    chrono::Utc::now().timestamp_millis(),
                    longitude,
                    latitude,
                );
                if satellite {
                    location = location
                        .with_satellites(8)
                        .with_altitude(12.5)
                        .with_bearing(63.4)
                        .with_speed(3.85);
                }

                let listener = listener.clone();
                let provider = provider.clone();
                let still_registered = still_registered.clone();
                let delivered = dispatcher.submit(move || {
                    if !still_registered.load(Ordering::Acquire) {
                        return Ok(());
                    }
                    listener.on_location(location);
                    if tick % 10 == 9 {
                        listener.on_status_changed(&provider, ProviderStatus::Available);
                    }
                    Ok(())
                });
                if delivered.is_err() {
                    tracing::debug!("owning thread gone, stopping simulated updates");
                    break;
                }
            }
        });

        self.updates = Some(Updates { task, registered });
        Ok(())
    }

    fn remove_updates(&mut self, _listener: &Arc<dyn LocationListener>) -> Result<(), ServiceError> {
        if let Some(updates) = self.updates.take() {
            updates.registered.store(false, Ordering::Release);
            updates.task.abort();
        }
        Ok(())
    }
}
