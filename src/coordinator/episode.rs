//! # Episodes
//!
//! An episode batches every lifecycle-affecting event that happens while the
//! surrounding runtime is mid-update into one stop-all → start-all transition.
//!
//! ## Phases
//!
//! ```text
//! collecting ──refs reach 0──► stopping ──all stopped──► starting ──► (abandoned)
//!      ▲                          │
//!      └──── new reference ───────┘  (pending stop watch is cancelled)
//! ```
//!
//! ## Architecture Note
//! The reference count is carried by [`EpisodeRef`] guards. Acquiring a guard
//! is only done by the coordinator actor; dropping one may happen anywhere
//! (typically inside a signal listener). The guard that takes the count to
//! zero does not touch any state; it sends [`Command::EpisodeQuiesced`] and
//! the actor decides what to do when it processes that command.

use crate::coordinator::identity::IdentityId;
use crate::coordinator::message::Command;
use crate::model::{ConfigId, ConfigRecord, ContextId, RecycleContext};
use parking_lot::Mutex;
use signal_framework::{join_all, ListenerHandle, Outcome, Signal};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub type EpisodeId = u64;

struct EpisodeShared {
    id: EpisodeId,
    refs: AtomicUsize,
    stop_watch: Mutex<Option<ListenerHandle>>,
    sender: mpsc::UnboundedSender<Command>,
}

impl EpisodeShared {
    fn cancel_stop_watch(&self) {
        if let Some(handle) = self.stop_watch.lock().take() {
            trace!(episode = self.id, "Cancelled pending stop watch");
            handle.cancel();
        }
    }
}

/// A counted reference to an episode. Dropping the last one lets the episode
/// move from collecting to stopping.
pub struct EpisodeRef {
    shared: Arc<EpisodeShared>,
}

impl EpisodeRef {
    pub fn episode(&self) -> EpisodeId {
        self.shared.id
    }
}

impl Drop for EpisodeRef {
    fn drop(&mut self) {
        if self.shared.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            trace!(episode = self.shared.id, "Last reference dropped");
            let _ = self.shared.sender.send(Command::EpisodeQuiesced {
                episode: self.shared.id,
            });
        }
    }
}

impl fmt::Debug for EpisodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpisodeRef")
            .field("episode", &self.shared.id)
            .field("refs", &self.shared.refs.load(Ordering::Acquire))
            .finish()
    }
}

/// Episode-level signals exposed to the runtime.
#[derive(Debug, Clone)]
pub struct EpisodeSignals {
    pub episode: EpisodeId,
    pub stopping: Signal,
    pub stopped: Signal,
    pub ready_to_start: Signal,
    pub install_called: Signal,
    pub rars_started: Signal,
}

/// What the episode hands back when it leaves the stop phase.
pub struct StartPlan {
    pub rar_started: Vec<Signal>,
    pub install_called: Vec<(Signal, IdentityId)>,
}

pub struct Episode {
    shared: Arc<EpisodeShared>,
    pub apps_stopping: Signal,
    pub apps_stopped: Signal,
    pub apps_starting: Signal,
    pub apps_install_called: Signal,
    pub rars_have_started: Signal,
    stopped_by_config: HashMap<ConfigId, Signal>,
    install_called: Vec<(Signal, IdentityId)>,
    rar_started: Vec<Signal>,
    context_stopped: Vec<Signal>,
    held_contexts: HashMap<ContextId, EpisodeRef>,
}

impl Episode {
    pub fn new(id: EpisodeId, sender: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            shared: Arc::new(EpisodeShared {
                id,
                refs: AtomicUsize::new(0),
                stop_watch: Mutex::new(None),
                sender,
            }),
            apps_stopping: Signal::new("resolves when applications are stopping"),
            apps_stopped: Signal::new("resolves when applications have stopped"),
            apps_starting: Signal::new("resolves when applications can start"),
            apps_install_called: Signal::new(
                "resolves when install has been called for all applications",
            ),
            rars_have_started: Signal::new("resolves when all resource adapters have started"),
            stopped_by_config: HashMap::new(),
            install_called: Vec::new(),
            rar_started: Vec::new(),
            context_stopped: Vec::new(),
            held_contexts: HashMap::new(),
        }
    }

    pub fn id(&self) -> EpisodeId {
        self.shared.id
    }

    pub fn references(&self) -> usize {
        self.shared.refs.load(Ordering::Acquire)
    }

    /// Takes a reference. Going from zero to one cancels any pending watch on
    /// "all stopped", so a stale stop cannot close a reopened episode.
    pub fn acquire(&self) -> EpisodeRef {
        if self.shared.refs.fetch_add(1, Ordering::AcqRel) == 0 {
            self.shared.cancel_stop_watch();
        }
        EpisodeRef {
            shared: self.shared.clone(),
        }
    }

    /// The stop signal for this config id, shared by every transition of the
    /// same workload within the episode.
    pub fn stopped_signal(&mut self, record: &ConfigRecord) -> Signal {
        self.stopped_by_config
            .entry(record.config_id.clone())
            .or_insert_with(|| {
                Signal::new(format!("resolves when the {} has stopped", record.label()))
            })
            .clone()
    }

    pub fn has_stopped_signal(&self, config_id: &ConfigId) -> bool {
        self.stopped_by_config.contains_key(config_id)
    }

    pub fn track_install_called(&mut self, signal: Signal, identity: IdentityId) {
        self.install_called.push((signal, identity));
    }

    pub fn track_rar_started(&mut self, signal: Signal) {
        self.rar_started.push(signal);
    }

    /// Resolves "stopping" once, joining the stop signals known at that moment
    /// into "stopped".
    pub fn begin_stopping(&self) {
        if self.apps_stopping.succeed() {
            debug!(
                episode = self.id(),
                workloads = self.stopped_by_config.len(),
                "Stopping"
            );
            join_all(self.stopped_by_config.values().cloned(), &self.apps_stopped);
        }
    }

    /// Watches "stopped" with a listener that the next [`acquire`](Self::acquire)
    /// from zero cancels. Replaces any previous watch.
    pub fn watch_stopped(&self, listener: impl FnOnce(&Outcome) + Send + 'static) {
        let handle = self.apps_stopped.on_completion_cancelable(listener);
        if let Some(previous) = self.shared.stop_watch.lock().replace(handle) {
            previous.cancel();
        }
    }

    pub fn cancel_stop_watch(&self) {
        self.shared.cancel_stop_watch();
    }

    /// Keeps `guard` until every component of the context is gone.
    pub fn hold_context(&mut self, context: &RecycleContext, guard: EpisodeRef) {
        if let Some(stopped) = &context.apps_stopped {
            self.context_stopped.push(stopped.clone());
        }
        self.held_contexts.insert(context.id.clone(), guard);
    }

    pub fn release_context(&mut self, context: &ContextId) -> Option<EpisodeRef> {
        self.held_contexts.remove(context)
    }

    /// Leaves the stop phase: resolves the recycle contexts' "apps stopped"
    /// signals and hands back what the start phase needs.
    pub fn finish_stopping(&mut self) -> StartPlan {
        self.cancel_stop_watch();
        for stopped in self.context_stopped.drain(..) {
            stopped.succeed();
        }
        self.stopped_by_config.clear();
        StartPlan {
            rar_started: std::mem::take(&mut self.rar_started),
            install_called: std::mem::take(&mut self.install_called),
        }
    }

    pub fn signals(&self) -> EpisodeSignals {
        EpisodeSignals {
            episode: self.id(),
            stopping: self.apps_stopping.clone(),
            stopped: self.apps_stopped.clone(),
            ready_to_start: self.apps_starting.clone(),
            install_called: self.apps_install_called.clone(),
            rars_started: self.rars_have_started.clone(),
        }
    }

    /// Releases anything still waiting for this episode to start.
    pub fn deactivate(&self) {
        self.apps_starting.succeed();
    }
}

impl fmt::Debug for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Episode")
            .field("id", &self.id())
            .field("refs", &self.references())
            .field("stopped", &self.stopped_by_config.len())
            .field("held_contexts", &self.held_contexts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{properties, ConfigRecord};
    use std::sync::atomic::AtomicBool;

    fn record(id: &str, location: &str) -> ConfigRecord {
        ConfigRecord::parse(id.into(), properties([("location", location)])).unwrap()
    }

    fn quiesced(rx: &mut mpsc::UnboundedReceiver<Command>) -> Vec<EpisodeId> {
        let mut seen = Vec::new();
        while let Ok(command) = rx.try_recv() {
            if let Command::EpisodeQuiesced { episode } = command {
                seen.push(episode);
            }
        }
        seen
    }

    #[test]
    fn only_the_last_reference_reports_quiescence() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let episode = Episode::new(3, tx);
        let first = episode.acquire();
        let second = episode.acquire();
        assert_eq!(episode.references(), 2);

        drop(first);
        assert!(quiesced(&mut rx).is_empty());
        drop(second);
        assert_eq!(quiesced(&mut rx), vec![3]);
        assert_eq!(episode.references(), 0);
    }

    #[test]
    fn stop_signal_is_shared_per_config() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut episode = Episode::new(1, tx);
        let orders = record("42", "apps/orders.war");
        let a = episode.stopped_signal(&orders);
        let b = episode.stopped_signal(&orders);
        assert!(a.same_as(&b));
        assert!(episode.has_stopped_signal(&orders.config_id));
    }

    #[test]
    fn begin_stopping_joins_the_snapshot_once() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut episode = Episode::new(1, tx);
        let orders = episode.stopped_signal(&record("1", "apps/orders.war"));
        episode.begin_stopping();

        // Arrives after the join: not part of "stopped".
        let _late = episode.stopped_signal(&record("2", "apps/late.war"));
        episode.begin_stopping();

        assert!(!episode.apps_stopped.is_resolved());
        orders.succeed();
        assert_eq!(episode.apps_stopped.outcome(), Some(Ok(true)));
    }

    #[test]
    fn reacquiring_cancels_the_stop_watch() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let episode = Episode::new(1, tx);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        episode.watch_stopped(move |_| flag.store(true, Ordering::SeqCst));

        let guard = episode.acquire();
        episode.begin_stopping();
        assert!(episode.apps_stopped.is_resolved());
        assert!(!fired.load(Ordering::SeqCst));
        drop(guard);
    }

    #[test]
    fn finishing_the_stop_phase_releases_context_waiters() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut episode = Episode::new(1, tx);
        let apps_stopped = Signal::new("jca users stopped");
        let context = RecycleContext::new("jca").with_apps_stopped(apps_stopped.clone());
        let guard = episode.acquire();
        episode.hold_context(&context, guard);
        assert_eq!(episode.references(), 1);

        let plan = episode.finish_stopping();
        assert!(plan.rar_started.is_empty());
        assert_eq!(apps_stopped.outcome(), Some(Ok(true)));
        assert!(episode.release_context(&context.id).is_some());
    }
}
