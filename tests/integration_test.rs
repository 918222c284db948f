mod common;

use app_coordinator::clients::ManagementError;
use app_coordinator::coordinator::{CoordinatorError, EventKind};
use app_coordinator::lifecycle::CoordinatorConfig;
use app_coordinator::mock::{MockCall, MockStateMachineFactory};
use app_coordinator::model::{properties, ConfigId, Diagnostic, Phase, WorkloadStatus};
use app_coordinator::workload::AppHandler;
use common::{app, app_with, count, started_order, Harness};
use signal_framework::Signal;

/// Full end-to-end startup: one resource adapter, two web applications, one
/// of which starts after the other.
#[tokio::test]
async fn test_startup_orders_resource_adapters_and_dependencies() {
    let mut h = Harness::start().await;

    h.system
        .config_source
        .deliver(vec![
            (ConfigId::from("1"), app("connectors/jdbc.rar")),
            (ConfigId::from("2"), app("apps/inventory.war")),
            (
                ConfigId::from("3"),
                app_with("apps/orders.war", &[("startAfter", "2")]),
            ),
        ])
        .await
        .expect("Failed to deliver configuration");

    // Nothing starts before the runtime is ready.
    h.settle().await;
    assert!(started_order(&h.drain_events()).is_empty());

    h.ready().await;
    let events = h.drain_events();
    let order = started_order(&events);
    assert_eq!(order.len(), 3);
    assert_eq!(order[0], "jdbc");
    let inventory = order.iter().position(|n| n == "inventory").unwrap();
    let orders = order.iter().position(|n| n == "orders").unwrap();
    assert!(inventory < orders, "orders started before inventory: {order:?}");

    for config_id in ["1", "2", "3"] {
        assert_eq!(
            h.system.management.status(config_id.into()).await.unwrap(),
            Some(WorkloadStatus::Started)
        );
    }
    h.factory.verify();
    h.system.shutdown().await.expect("Shutdown failed");
}

#[tokio::test]
async fn test_settle_waits_out_a_long_start_after_chain() {
    let h = Harness::start().await;
    h.update("0", app("apps/app0.war")).await;
    for i in 1..40 {
        let previous = (i - 1).to_string();
        h.update(
            &i.to_string(),
            app_with(&format!("apps/app{i}.war"), &[("startAfter", previous.as_str())]),
        )
        .await;
    }
    h.ready().await;

    assert_eq!(h.phase_of("app39"), Some(Phase::Started));
    assert_eq!(
        h.system.management.status("39".into()).await.unwrap(),
        Some(WorkloadStatus::Started)
    );
}

#[tokio::test]
async fn test_changes_before_ready_coalesce_into_one_episode() {
    let mut h = Harness::start().await;
    h.update("1", app("apps/orders.war")).await;
    h.update("2", app("apps/billing.war")).await;
    // Redelivery of an unchanged record is an update, not a new identity.
    h.update("1", app("apps/orders.war")).await;
    h.ready().await;

    let events = h.drain_events();
    assert_eq!(
        count(&events, |k| matches!(k, EventKind::EpisodeStopping { .. })),
        1
    );
    assert_eq!(
        count(&events, |k| matches!(k, EventKind::EpisodeStarting { .. })),
        1
    );
    assert_eq!(h.factory.created(), 2);
    assert_eq!(h.phase_of("orders"), Some(Phase::Started));
    assert_eq!(h.phase_of("billing"), Some(Phase::Started));
}

#[tokio::test]
async fn test_episode_waits_for_every_stop() {
    let factory = MockStateMachineFactory::manual();
    let mut h = Harness::with_factory(CoordinatorConfig::default(), factory.clone()).await;
    h.update("1", app("apps/orders.war")).await;
    h.ready().await;

    let events = h.drain_events();
    assert_eq!(
        count(&events, |k| matches!(k, EventKind::EpisodeStopping { .. })),
        1
    );
    assert_eq!(
        count(&events, |k| matches!(k, EventKind::EpisodeStarting { .. })),
        0
    );

    let signals = factory.latest("orders").unwrap().configured().unwrap();
    assert!(!signals.starting.is_resolved());
    signals.stopped.succeed();
    h.settle().await;

    let events = h.drain_events();
    assert_eq!(
        count(&events, |k| matches!(k, EventKind::EpisodeStarting { .. })),
        1
    );
    let episode = h.system.runtime.episode_signals().await.unwrap();
    assert!(episode.is_none(), "episode still open after starting");
}

#[tokio::test]
async fn test_force_restart_recycles_every_configured_app() {
    let mut h = Harness::start().await;
    h.update("1", app("connectors/jdbc.rar")).await;
    h.update("2", app("apps/orders.war")).await;
    h.ready().await;
    h.drain_events();

    let features = Signal::new("feature updates completed");
    h.system.runtime.feature_updates(features.clone()).await.unwrap();
    let restart = Signal::new("infrastructure reprovisioned");
    h.system.runtime.force_restart(restart.clone()).await.unwrap();
    h.settle().await;
    assert!(h.factory.calls_for("orders").iter().all(|c| !matches!(c, MockCall::Recycle { .. })));

    restart.succeed();
    features.succeed();
    h.settle().await;

    for name in ["jdbc", "orders"] {
        let recycles = h
            .factory
            .calls_for(name)
            .into_iter()
            .filter(|c| matches!(c, MockCall::Recycle { .. }))
            .count();
        assert_eq!(recycles, 1, "{name} recycled {recycles} times");
        assert_eq!(h.phase_of(name), Some(Phase::Started));
    }
    assert!(h
        .factory
        .calls_for("jdbc")
        .contains(&MockCall::Recycle {
            name: "jdbc".into(),
            with_started: true
        }));

    let events = h.drain_events();
    assert_eq!(
        count(&events, |k| matches!(
            k,
            EventKind::PhaseTransition {
                new: Phase::Stopping,
                ..
            }
        )),
        2
    );
    assert_eq!(started_order(&events).len(), 2);
}

#[tokio::test]
async fn test_failed_restart_signal_restarts_nothing() {
    let h = Harness::start().await;
    h.update("1", app("apps/orders.war")).await;
    h.ready().await;

    let restart = Signal::new("infrastructure reprovisioned");
    h.system.runtime.force_restart(restart.clone()).await.unwrap();
    restart.fail(signal_framework::SignalError::failed("provisioning failed"));
    h.settle().await;

    assert!(h
        .factory
        .calls_for("orders")
        .iter()
        .all(|c| !matches!(c, MockCall::Recycle { .. })));
    assert_eq!(h.phase_of("orders"), Some(Phase::Started));
}

#[tokio::test]
async fn test_start_failure_fails_started_signal() {
    let factory = MockStateMachineFactory::auto();
    factory.fail_starts_of("orders", "port already in use");
    let h = Harness::with_factory(CoordinatorConfig::default(), factory.clone()).await;
    h.update("1", app("apps/orders.war")).await;
    h.update("2", app_with("apps/audit.war", &[("startAfter", "1")]))
        .await;
    h.ready().await;

    assert_eq!(
        h.system.management.status("1".into()).await.unwrap(),
        Some(WorkloadStatus::Failed)
    );
    let signals = factory.latest("orders").unwrap().configured().unwrap();
    assert!(matches!(signals.started.outcome(), Some(Err(_))));
    assert_eq!(signals.install_called.outcome(), Some(Ok(true)));

    // The dependent never saw its dependency start.
    assert_eq!(
        h.system.management.status("2".into()).await.unwrap(),
        Some(WorkloadStatus::Pending)
    );
    assert_eq!(h.phase_of("audit"), Some(Phase::Installed));
}

#[tokio::test]
async fn test_invalid_configuration_is_diagnosed_once() {
    let h = Harness::start().await;
    h.update("5", properties([("name", "orphan")])).await;
    h.update("5", properties([("name", "orphan")])).await;
    h.ready().await;

    let diagnostics = h.system.management.diagnostics().await.unwrap();
    assert_eq!(
        diagnostics,
        vec![Diagnostic::InvalidConfig {
            config_id: "5".into(),
            missing: vec!["location".into(), "type".into()],
        }]
    );
    assert_eq!(
        h.system.management.status("5".into()).await.unwrap(),
        Some(WorkloadStatus::Unconfigured)
    );
    assert_eq!(h.factory.created(), 0);
    assert_eq!(h.system.management.describe().await.unwrap(), "no applications\n");

    h.update("5", app_with("apps/orphan.war", &[("name", "orphan")]))
        .await;
    h.settle().await;
    assert_eq!(
        h.system.management.describe().await.unwrap(),
        "orphan [5] type=war phase=started status=started\n"
    );
}

#[tokio::test]
async fn test_handler_removal_recycles_and_rebinds() {
    let h = Harness::start().await;
    h.update("1", app("apps/orders.war")).await;
    h.ready().await;
    let machine = h.factory.latest("orders").unwrap();
    assert_eq!(machine.handler().map(|h| h.name), Some("war-handler".to_string()));

    assert_eq!(
        h.system.runtime.handler_unavailable("ear").await,
        Err(CoordinatorError::UnknownType("ear".into()))
    );

    h.system.runtime.handler_unavailable("war").await.unwrap();
    h.settle().await;
    assert_eq!(machine.handler(), None);
    assert!(h.factory.calls_for("orders").contains(&MockCall::Recycle {
        name: "orders".into(),
        with_started: false
    }));

    h.system
        .runtime
        .handler_available(AppHandler::new("war", "war-handler-2"))
        .await
        .unwrap();
    h.settle().await;
    assert_eq!(
        machine.handler().map(|h| h.name),
        Some("war-handler-2".to_string())
    );
    assert_eq!(machine.phase(), Phase::Started);
}

#[tokio::test]
async fn test_management_commands_drive_state_machines() {
    let h = Harness::start().await;
    h.update("1", app("apps/orders.war")).await;
    h.ready().await;

    h.system.management.stop("orders").await.unwrap();
    h.settle().await;
    assert_eq!(h.phase_of("orders"), Some(Phase::Stopped));

    h.system.management.start("orders").await.unwrap();
    h.settle().await;
    assert_eq!(h.phase_of("orders"), Some(Phase::Started));

    h.system.management.restart("orders").await.unwrap();
    assert_eq!(
        h.system.management.start("nope").await,
        Err(ManagementError::NotFound("nope".into()))
    );

    let workloads = h.system.management.workloads().await.unwrap();
    assert_eq!(workloads.len(), 1);
    assert_eq!(workloads[0].name, "orders");
    assert_eq!(workloads[0].app_type, "war");
    assert!(!workloads[0].departing);
}

#[tokio::test]
async fn test_shutdown_uninstalls_and_cleans_caches() {
    let root = tempfile::tempdir().unwrap();
    for dir in ["cache/1", "cacheOverlay/1", "cache/2", "cache/99", "cacheAdapt/99"] {
        std::fs::create_dir_all(root.path().join(dir)).unwrap();
    }
    let config = CoordinatorConfig::default().with_cache_root(root.path());
    let h = Harness::with_config(config).await;
    h.update("1", app("apps/orders.war")).await;
    h.update("2", app("apps/billing.war")).await;
    h.ready().await;

    h.delete("2").await;
    h.settle().await;
    assert!(!root.path().join("cache/2").exists());
    assert_eq!(
        h.system.management.status("2".into()).await.unwrap(),
        Some(WorkloadStatus::Removed)
    );

    let factory = h.factory.clone();
    h.system.shutdown().await.expect("Shutdown failed");

    assert!(root.path().join("cache/1").exists());
    assert!(root.path().join("cacheOverlay/1").exists());
    assert!(!root.path().join("cache/99").exists());
    assert!(!root.path().join("cacheAdapt/99").exists());
    assert_eq!(factory.active_count("orders"), 0);
    assert_eq!(factory.active_count("billing"), 0);
}

#[tokio::test]
async fn test_requests_after_shutdown_begins_are_refused() {
    let h = Harness::start().await;
    h.update("1", app("apps/orders.war")).await;
    h.ready().await;

    let removals = h.system.runtime.shutting_down().await.unwrap();
    assert_eq!(removals.len(), 1);
    assert!(removals.iter().all(Signal::is_resolved));

    assert_eq!(
        h.system.management.start("orders").await,
        Err(ManagementError::Unavailable)
    );
    h.update("2", app("apps/late.war")).await;
    h.settle().await;
    assert!(h.factory.calls_for("late").is_empty());
    assert!(h.system.client().join_episode().await.unwrap().is_none());

    h.system.shutdown().await.expect("Shutdown failed");
}
