//! # Coordinator Demo
//!
//! Walks through one runtime start with three applications:
//! 1. A resource adapter (`jdbc.rar`) that every other workload waits for.
//! 2. `inventory.war`, and `orders.war` which starts after it.
//! 3. A force restart once the runtime reprovisions its features.
//!
//! Settings are read from `coordinator.toml` when present.

use app_coordinator::lifecycle::{setup_tracing, CoordinatorConfig, CoordinatorSystem};
use app_coordinator::mock::MockStateMachineFactory;
use app_coordinator::model::{properties, ConfigId};
use app_coordinator::workload::AppHandler;
use signal_framework::Signal;
use std::path::Path;
use tracing::{info, Instrument};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config_path = Path::new("coordinator.toml");
    let config = if config_path.exists() {
        CoordinatorConfig::load(config_path)?
    } else {
        CoordinatorConfig::default()
    };
    info!(?config, "Starting coordinator demo");

    let factory = MockStateMachineFactory::auto();
    let system = CoordinatorSystem::new(config, factory.clone());
    let mut events = system.management.subscribe();

    let span = tracing::info_span!("type_support");
    async {
        for app_type in ["rar", "war"] {
            system.runtime.type_supported(app_type).await?;
            system
                .runtime
                .handler_available(AppHandler::new(app_type, format!("{app_type}-container")))
                .await?;
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    }
    .instrument(span)
    .await?;

    let span = tracing::info_span!("configuration");
    async {
        system
            .config_source
            .deliver(vec![
                (ConfigId::from("1"), properties([("location", "connectors/jdbc.rar")])),
                (ConfigId::from("2"), properties([("location", "apps/inventory.war")])),
                (
                    ConfigId::from("3"),
                    properties([("location", "apps/orders.war"), ("startAfter", "2")]),
                ),
            ])
            .await
    }
    .instrument(span)
    .await?;

    system.runtime.ready_to_start().await?;
    system.client().settle().await?;
    info!(applications = %system.management.describe().await?, "After startup");

    let span = tracing::info_span!("force_restart");
    async {
        let features = Signal::new("resolves when feature updates are complete");
        system.runtime.feature_updates(features.clone()).await?;
        let restart = Signal::new("resolves when shared infrastructure is reprovisioned");
        system.runtime.force_restart(restart.clone()).await?;
        restart.succeed();
        features.succeed();
        system.client().settle().await?;
        Ok::<_, Box<dyn std::error::Error>>(())
    }
    .instrument(span)
    .await?;

    let mut transitions = 0;
    while let Ok(event) = events.try_recv() {
        transitions += 1;
        info!(seq = event.seq, kind = ?event.kind, "Event");
    }
    info!(transitions, created = factory.created(), "Demo finished");

    system.shutdown().await?;
    Ok(())
}
