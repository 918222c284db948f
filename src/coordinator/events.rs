//! # Coordinator events
//!
//! The management-facing notification stream. Every workload phase change and
//! every episode milestone is published on a [`Bus`], a thin wrapper over
//! [`tokio::sync::broadcast`].
//!
//! ## Rules
//! - **Non-blocking publish**: the coordinator never waits for subscribers.
//! - **No persistence**: events published with no subscriber are dropped.
//! - **Lag**: slow subscribers observe `RecvError::Lagged(n)` and skip ahead.
//! - **Ordering**: `seq` is global and strictly increasing.

use crate::model::{ConfigId, Phase};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::sync::broadcast;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A workload's state machine reported a new phase.
    PhaseTransition {
        name: String,
        config_id: ConfigId,
        old: Phase,
        new: Phase,
    },
    /// A new episode started collecting.
    EpisodeOpened { episode: u64 },
    /// The episode's reference count reached zero; waiting for stops.
    EpisodeStopping { episode: u64 },
    /// Every stop in the episode finished; workloads may start.
    EpisodeStarting { episode: u64 },
    /// Joining the episode's stop signals failed. The episode stays open.
    EpisodeStopFailed { episode: u64, reason: String },
    /// The episode released the reference it held for a recycle context.
    ContextReleased { context: String },
    /// A workload finished uninstalling and left the identity maps.
    WorkloadRemoved { name: String, config_id: ConfigId },
}

/// One published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorEvent {
    pub seq: u64,
    #[serde(skip)]
    pub at: SystemTime,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl CoordinatorEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, Ordering::Relaxed),
            at: SystemTime::now(),
            kind,
        }
    }
}

/// Broadcast channel for coordinator events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<CoordinatorEvent>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, kind: EventKind) {
        let _ = self.tx.send(CoordinatorEvent::new(kind));
    }

    /// A receiver that observes events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(EventKind::EpisodeOpened { episode: 1 });
        bus.publish(EventKind::EpisodeStopping { episode: 1 });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::EpisodeOpened { episode: 1 });
        assert!(second.seq > first.seq);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = Bus::new(0);
        bus.publish(EventKind::ContextReleased {
            context: "jca".into(),
        });
    }
}
