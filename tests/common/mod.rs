#![allow(dead_code)]

use app_coordinator::coordinator::{CoordinatorEvent, EventKind};
use app_coordinator::lifecycle::{CoordinatorConfig, CoordinatorSystem};
use app_coordinator::mock::MockStateMachineFactory;
use app_coordinator::model::{properties, ConfigId, ConfigProperties, Phase};
use app_coordinator::workload::AppHandler;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A running coordinator driven by auto-completing mock state machines, with
/// `rar` and `war` already supported and handled.
pub struct Harness {
    pub system: CoordinatorSystem,
    pub factory: Arc<MockStateMachineFactory>,
    pub events: broadcast::Receiver<CoordinatorEvent>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_config(CoordinatorConfig::default()).await
    }

    pub async fn with_config(config: CoordinatorConfig) -> Self {
        Self::with_factory(config, MockStateMachineFactory::auto()).await
    }

    pub async fn with_factory(
        config: CoordinatorConfig,
        factory: Arc<MockStateMachineFactory>,
    ) -> Self {
        let system = CoordinatorSystem::new(config, factory.clone());
        let events = system.management.subscribe();
        for app_type in ["rar", "war"] {
            system.runtime.type_supported(app_type).await.unwrap();
            system
                .runtime
                .handler_available(AppHandler::new(app_type, format!("{app_type}-handler")))
                .await
                .unwrap();
        }
        Self {
            system,
            factory,
            events,
        }
    }

    pub async fn update(&self, config_id: &str, props: ConfigProperties) {
        self.system
            .config_source
            .updated(ConfigId::from(config_id), props)
            .await
            .unwrap();
    }

    pub async fn delete(&self, config_id: &str) {
        self.system
            .config_source
            .deleted(ConfigId::from(config_id))
            .await
            .unwrap();
    }

    pub async fn ready(&self) {
        self.system.runtime.ready_to_start().await.unwrap();
        self.settle().await;
    }

    pub async fn settle(&self) {
        self.system.client().settle().await.unwrap();
    }

    /// Every event published since the last call.
    pub fn drain_events(&mut self) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    pub fn phase_of(&self, name: &str) -> Option<Phase> {
        self.factory.latest(name).map(|machine| machine.phase())
    }
}

pub fn app(location: &str) -> ConfigProperties {
    properties([("location", location)])
}

pub fn app_with(location: &str, extra: &[(&str, &str)]) -> ConfigProperties {
    let mut props = app(location);
    for (key, value) in extra {
        props.insert(key.to_string(), value.to_string());
    }
    props
}

/// Names that reached `Started`, in the order the coordinator saw them.
pub fn started_order(events: &[EventKind]) -> Vec<String> {
    events
        .iter()
        .filter_map(|kind| match kind {
            EventKind::PhaseTransition {
                name,
                new: Phase::Started,
                ..
            } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

pub fn count(events: &[EventKind], matches: impl Fn(&EventKind) -> bool) -> usize {
    events.iter().filter(|kind| matches(kind)).count()
}
