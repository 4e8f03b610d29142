mod simulator;

use std::time::Duration;

use anyhow::Context;
use fixlink_core::{ProviderId, SharedGpsState, Sink, SubscriptionConfig};
use fixlink_protocol::{encode_event, SinkEvent};
use fixlink_runtime::{ChannelSink, Looper, ProviderSubscription};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::simulator::SimulatedReceiver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,fixlink_runtime=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fixlink demo starting...");

    // Configuration
    let config = match std::env::var("FIXLINK_CONFIG") {
        Ok(path) => SubscriptionConfig::load(&path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        Err(_) => SubscriptionConfig::default(),
    };
    tracing::info!(?config, "configuration loaded");

    // Owning thread
    let (dispatcher, owner) = Looper::spawn("fixlink-owner")?;

    let service = SimulatedReceiver::new(tokio::runtime::Handle::current(), dispatcher.clone());
    let (sink, mut events) = ChannelSink::new();
    let subscription = ProviderSubscription::new(&dispatcher, service, sink, &config);

    // Consumer: keeps the GPS state and logs every event
    let gps_state = SharedGpsState::new();
    let mut state_sink = gps_state.clone();
    let consumer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                SinkEvent::Connection(msg) => state_sink.report_connection(msg.state),
                SinkEvent::Fix(fix) => state_sink.report_fix(fix),
            }
            match encode_event(&event) {
                Ok(line) => tracing::info!(target: "fixlink_demo::events", "{}", line),
                Err(e) => tracing::warn!("failed to encode event: {}", e),
            }
        }
    });

    let mut controller = tokio::spawn(switch_providers(subscription.clone()));

    tracing::info!("fixlink demo running, press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = &mut controller => {
            tracing::info!("Provider script finished, shutting down...");
        }
    }
    controller.abort();

    let snapshot = gps_state.snapshot();
    tracing::info!(
        connection = %snapshot.connection,
        connected = snapshot.connection.is_connected(),
        fixes = snapshot.fix_count,
        position = ?gps_state.position(),
        "final GPS state"
    );

    subscription.shutdown();
    dispatcher.quit()?;
    drop(subscription);

    let result = tokio::task::spawn_blocking(move || owner.join())
        .await?
        .map_err(|_| anyhow::anyhow!("owning thread panicked"))?;
    result.context("owning thread failed")?;

    if tokio::time::timeout(Duration::from_secs(1), consumer)
        .await
        .is_err()
    {
        tracing::warn!("consumer did not drain in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Walk through the provider selections a controller might make.
async fn switch_providers(subscription: ProviderSubscription) {
    let script: [(Option<ProviderId>, u64); 5] = [
        (Some(ProviderId::network()), 6),
        (None, 2),
        (Some(ProviderId::new("galileo")), 2),
        (Some(ProviderId::gps()), 5),
        (None, 1),
    ];

    // let the configured default provider run first
    tokio::time::sleep(Duration::from_secs(5)).await;

    for (provider, hold_secs) in script {
        tracing::info!(?provider, "switching provider");
        subscription.set_provider(provider);
        tokio::time::sleep(Duration::from_secs(hold_secs)).await;
    }
}
