//! # Coordinator Actor
//!
//! The owner of every cross-workload map: identities, blocked configs, type
//! support, recycle contexts, the start-after graph and the current episode.
//!
//! # Architecture Note
//! This struct is the "Server" half of the coordinator. It runs in one Tokio
//! task and processes [`Command`]s strictly one at a time, so the identity
//! maps and the episode are always updated together without a lock.
//!
//! Signals complete on whatever thread resolves them. A listener registered
//! here never touches the actor's state; it sends a command back on the
//! actor's own channel (see [`Command::EpisodeStopped`],
//! [`Command::IdentityRemoved`], [`Command::RestartAll`]). Episode guards do
//! the same when the last one is dropped ([`Command::EpisodeQuiesced`]).
//!
//! The actor holds a sender to its own channel, so the loop only ends on
//! [`Command::Shutdown`] or after an invariant violation.
//!
//! ## Episode flow
//!
//! ```text
//! event ──join_episode()──► configure / recycle ──guard dropped──► EpisodeQuiesced
//!                                                                    │
//!         EpisodeStopped ◄── "apps stopped" join ◄── begin_stopping ◄┘
//!               │
//!               └─► finish_stopping ─► leave episode ─► "ready to start" (after features)
//! ```

use crate::coordinator::cache;
use crate::coordinator::client::CoordinatorClient;
use crate::coordinator::episode::{Episode, EpisodeId, EpisodeRef};
use crate::coordinator::error::CoordinatorError;
use crate::coordinator::events::{Bus, EventKind};
use crate::coordinator::graph::StartAfterGraph;
use crate::coordinator::identity::{IdentityId, IdentityTable, Resolution, WorkloadIdentity};
use crate::coordinator::message::{Command, Response, RuntimeNotification, WorkloadSummary};
use crate::coordinator::recycle::{ContextRemoval, RecycleRegistry};
use crate::coordinator::type_support::TypeSupportTable;
use crate::lifecycle::CoordinatorConfig;
use crate::model::{
    ConfigId, ConfigProperties, ConfigRecord, ContextId, Diagnostic, Phase, RecycleComponent,
    RecycleContext, WorkloadStatus,
};
use crate::workload::{
    ConfigureSignals, PhaseReporter, RecycleSignals, StateMachine, StateMachineFactory,
};
use signal_framework::{join_all, Outcome, Signal};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn, Level};

pub struct CoordinatorActor {
    receiver: mpsc::UnboundedReceiver<Command>,
    sender: mpsc::UnboundedSender<Command>,
    factory: Arc<dyn StateMachineFactory>,
    bus: Bus,
    rar_type: String,
    cache_root: Option<PathBuf>,

    identities: IdentityTable,
    types: TypeSupportTable,
    graph: StartAfterGraph,
    recycle: RecycleRegistry,

    episode: Option<Episode>,
    last_episode: EpisodeId,
    /// Resolved when the runtime is ready to start workloads.
    ready: Signal,
    /// Resolved when the resource-adapter type is recognised.
    rar_support: Signal,
    /// Latest "feature updates completed" notification.
    feature_ready: Option<Signal>,

    statuses: BTreeMap<ConfigId, WorkloadStatus>,
    diagnostics: Vec<Diagnostic>,
    invalid: BTreeSet<ConfigId>,
    /// Machines uninstalled at shutdown, kept alive until the actor exits.
    retired: Vec<Box<dyn StateMachine>>,
    shutting_down: bool,
}

impl CoordinatorActor {
    /// Creates the actor and the client that talks to it. The actor does
    /// nothing until [`run`](Self::run) is spawned.
    pub fn new(
        config: &CoordinatorConfig,
        factory: Arc<dyn StateMachineFactory>,
    ) -> (Self, CoordinatorClient) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let bus = Bus::new(config.event_capacity);
        let client = CoordinatorClient::new(sender.clone(), bus.clone());
        let actor = Self {
            receiver,
            sender,
            factory,
            bus,
            rar_type: config.resource_adapter_type.clone(),
            cache_root: config.cache_root.clone(),
            identities: IdentityTable::new(),
            types: TypeSupportTable::new(),
            graph: StartAfterGraph::new(),
            recycle: RecycleRegistry::new(),
            episode: None,
            last_episode: 0,
            ready: Signal::new("resolves when the runtime is ready to start applications"),
            rar_support: Signal::new("resolves when resource adapters are supported"),
            feature_ready: None,
            statuses: BTreeMap::new(),
            diagnostics: Vec::new(),
            invalid: BTreeSet::new(),
            retired: Vec::new(),
            shutting_down: false,
        };
        (actor, client)
    }

    pub async fn run(mut self) {
        info!(rar_type = %self.rar_type, "Coordinator started");

        // The first episode stays open until the runtime is ready.
        if let Some(guard) = self.join_episode() {
            self.ready.on_completion(move |_| drop(guard));
        }

        while let Some(command) = self.receiver.recv().await {
            if self.handle(command).is_break() {
                break;
            }
        }

        info!(
            workloads = self.identities.len(),
            retired = self.retired.len(),
            "Coordinator stopped"
        );
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::ConfigUpdated {
                config_id,
                properties,
                respond_to,
            } => {
                let result = self.config_updated(config_id, properties);
                self.reply_mutating(respond_to, result)
            }
            Command::ConfigDeleted {
                config_id,
                respond_to,
            } => {
                let result = self.config_deleted(config_id);
                self.reply_mutating(respond_to, result)
            }
            Command::TypeSupported {
                app_type,
                respond_to,
            } => {
                self.type_supported(&app_type);
                self.reply_mutating(respond_to, Ok(()))
            }
            Command::TypeUnsupported {
                app_type,
                respond_to,
            } => {
                debug!(%app_type, "Type no longer supported");
                self.types.entry(&app_type).supported = false;
                self.reply_mutating(respond_to, Ok(()))
            }
            Command::TypeHandlerAvailable {
                handler,
                respond_to,
            } => {
                info!(app_type = %handler.app_type, handler = %handler.name, "Handler available");
                let app_type = handler.app_type.clone();
                self.types.entry(&app_type).handler = Some(handler);
                self.notify_waiting(&app_type);
                self.reply_mutating(respond_to, Ok(()))
            }
            Command::TypeHandlerUnavailable {
                app_type,
                respond_to,
            } => {
                let result = self.type_handler_unavailable(&app_type);
                self.reply_mutating(respond_to, result)
            }
            Command::RecycleContextSet {
                context,
                respond_to,
            } => {
                self.recycle_context_set(context);
                self.reply_mutating(respond_to, Ok(()))
            }
            Command::RecycleContextUnset {
                context,
                respond_to,
            } => {
                self.recycle_context_unset(context);
                self.reply_mutating(respond_to, Ok(()))
            }
            Command::RecycleComponentSet {
                component,
                respond_to,
            } => {
                debug!(component = %component.id, "Component set");
                self.recycle.set_component(component);
                self.reply_mutating(respond_to, Ok(()))
            }
            Command::RecycleComponentUnset {
                component,
                respond_to,
            } => {
                self.recycle_component_unset(component);
                self.reply_mutating(respond_to, Ok(()))
            }
            Command::RecycleApplications { names, respond_to } => {
                self.recycle_applications(names);
                self.reply_mutating(respond_to, Ok(()))
            }
            Command::RuntimeNotification {
                kind,
                signal,
                respond_to,
            } => {
                self.runtime_notification(kind, signal);
                self.reply(respond_to, Ok(()))
            }
            Command::RuntimeReadyToStart { respond_to } => {
                info!("Runtime ready to start applications");
                self.rar_support.succeed();
                self.ready.succeed();
                self.reply(respond_to, Ok(()))
            }
            Command::RuntimeShuttingDown { respond_to } => {
                let removals = self.runtime_shutting_down();
                self.reply_mutating(respond_to, Ok(removals))
            }
            Command::JoinEpisode { respond_to } => {
                let guard = self.join_episode();
                self.reply(respond_to, Ok(guard))
            }
            Command::EpisodeSignals { respond_to } => {
                let signals = self.episode.as_ref().map(Episode::signals);
                self.reply(respond_to, Ok(signals))
            }
            Command::Start { name, respond_to } => {
                let result = self.with_machine(&name, |m| m.start());
                self.reply(respond_to, result)
            }
            Command::Stop { name, respond_to } => {
                let result = self.with_machine(&name, |m| m.stop());
                self.reply(respond_to, result)
            }
            Command::Restart { name, respond_to } => {
                let result = self.with_machine(&name, |m| m.restart());
                self.reply(respond_to, result)
            }
            Command::Describe { respond_to } => self.reply(respond_to, Ok(self.describe())),
            Command::Workloads { respond_to } => self.reply(respond_to, Ok(self.workloads())),
            Command::Status {
                config_id,
                respond_to,
            } => {
                let status = self.statuses.get(&config_id).copied();
                self.reply(respond_to, Ok(status))
            }
            Command::Diagnostics { respond_to } => {
                self.reply(respond_to, Ok(self.diagnostics.clone()))
            }

            Command::PhaseChanged { identity, phase } => {
                self.phase_changed(identity, phase);
                ControlFlow::Continue(())
            }
            Command::StartFailed { identity, reason } => {
                self.start_failed(identity, reason);
                ControlFlow::Continue(())
            }
            Command::EpisodeQuiesced { episode } => {
                self.episode_quiesced(episode);
                ControlFlow::Continue(())
            }
            Command::EpisodeStopped { episode, outcome } => {
                self.episode_stopped(episode, outcome);
                ControlFlow::Continue(())
            }
            Command::IdentityRemoved {
                identity,
                outcome,
                guard,
            } => {
                let result = self.identity_removed(identity, outcome, guard);
                self.check_fatal(result)
            }
            Command::RestartAll { guard } => {
                self.restart_apps(guard);
                ControlFlow::Continue(())
            }
            Command::Settle {
                remaining,
                respond_to,
            } => {
                if self.receiver.is_empty() {
                    let _ = respond_to.send(());
                } else if remaining == 0 {
                    warn!(queued = self.receiver.len(), "Settle gave up on a busy mailbox");
                    let _ = respond_to.send(());
                } else {
                    let _ = self.sender.send(Command::Settle {
                        remaining: remaining - 1,
                        respond_to,
                    });
                }
                ControlFlow::Continue(())
            }
            Command::Shutdown => {
                debug!("Shutdown requested");
                ControlFlow::Break(())
            }
        }
    }

    fn reply<T>(
        &self,
        respond_to: Response<T>,
        result: Result<T, CoordinatorError>,
    ) -> ControlFlow<()> {
        let fatal = match &result {
            Err(CoordinatorError::InvariantViolation(reason)) => {
                error!(%reason, "Invariant violation, coordinator stopping");
                true
            }
            _ => false,
        };
        let _ = respond_to.send(result);
        if fatal {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn reply_mutating<T>(
        &self,
        respond_to: Response<T>,
        result: Result<T, CoordinatorError>,
    ) -> ControlFlow<()> {
        let flow = self.reply(respond_to, result);
        if flow.is_continue() {
            self.dump_applications();
        }
        flow
    }

    fn check_fatal(&self, result: Result<(), CoordinatorError>) -> ControlFlow<()> {
        match result {
            Err(CoordinatorError::InvariantViolation(reason)) => {
                error!(%reason, "Invariant violation, coordinator stopping");
                ControlFlow::Break(())
            }
            Err(e) => {
                warn!(error = %e, "Internal command failed");
                ControlFlow::Continue(())
            }
            Ok(()) => ControlFlow::Continue(()),
        }
    }

    // =====================================================================
    // Episodes
    // =====================================================================

    /// A reference on the current episode, opening a new one if none is open.
    fn join_episode(&mut self) -> Option<EpisodeRef> {
        if self.shutting_down {
            return None;
        }
        if self.episode.is_none() {
            self.last_episode += 1;
            let id = self.last_episode;
            debug!(episode = id, "Episode opened");
            self.bus.publish(EventKind::EpisodeOpened { episode: id });
            self.episode = Some(Episode::new(id, self.sender.clone()));
        }
        self.episode.as_ref().map(Episode::acquire)
    }

    fn episode_quiesced(&mut self, episode: EpisodeId) {
        match &self.episode {
            Some(current) if current.id() == episode && current.references() == 0 => {}
            _ => {
                trace!(episode, "Stale quiescence ignored");
                return;
            }
        }
        self.check_cycles();

        let Some(current) = self.episode.as_ref() else {
            return;
        };
        if !current.apps_stopping.is_resolved() {
            info!(episode, "Episode stopping");
            self.bus.publish(EventKind::EpisodeStopping { episode });
        }
        let sender = self.sender.clone();
        current.watch_stopped(move |outcome| {
            let _ = sender.send(Command::EpisodeStopped {
                episode,
                outcome: outcome.clone(),
            });
        });
        current.begin_stopping();
    }

    fn episode_stopped(&mut self, episode: EpisodeId, outcome: Outcome) {
        let Some(current) = self.episode.as_mut() else {
            return;
        };
        if current.id() != episode || current.references() > 0 {
            debug!(episode, "Stale stop notification ignored");
            return;
        }
        if let Err(e) = outcome {
            error!(episode, error = %e, "Stopping applications failed, episode stalled");
            self.bus.publish(EventKind::EpisodeStopFailed {
                episode,
                reason: e.to_string(),
            });
            return;
        }

        let plan = current.finish_stopping();
        info!(episode, "All applications stopped, episode starting");
        self.bus.publish(EventKind::EpisodeStarting { episode });

        let install_called: Vec<Signal> = plan
            .install_called
            .into_iter()
            .filter(|(_, id)| {
                self.identities
                    .get(*id)
                    .and_then(|identity| identity.state_machine.as_ref())
                    .map(|machine| !machine.is_blocked())
                    .unwrap_or(false)
            })
            .map(|(signal, _)| signal)
            .collect();
        let rar_started = plan.rar_started;
        let rars_target = current.rars_have_started.clone();
        let install_target = current.apps_install_called.clone();
        let starting = current.apps_starting.clone();
        starting.on_completion(move |outcome| match outcome {
            Ok(true) => {
                join_all(rar_started, &rars_target);
                join_all(install_called, &install_target);
            }
            other => {
                rars_target.resolve(other.clone());
                install_target.resolve(other.clone());
            }
        });

        self.episode = None;
        match &self.feature_ready {
            Some(features) => features.on_completion(move |_| {
                starting.succeed();
            }),
            None => {
                starting.succeed();
            }
        }
    }

    fn check_cycles(&mut self) {
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for identity in self.identities.iter().filter(|i| !i.is_departing()) {
            let targets = identity
                .config
                .start_after
                .iter()
                .filter_map(|dep| self.identities.by_config(dep))
                .filter(|dep| !dep.is_departing())
                .map(|dep| dep.name.clone())
                .collect();
            edges.insert(identity.name.clone(), targets);
        }

        let report = self.graph.check_cycles(&edges);
        for name in &report.members {
            if let Some(identity) = self
                .identities
                .id_for_name(name)
                .and_then(|id| self.identities.get(id))
            {
                self.statuses
                    .insert(identity.config_id().clone(), WorkloadStatus::Cyclic);
            }
        }
        self.diagnostics.extend(report.diagnostics);
    }

    // =====================================================================
    // Configuration
    // =====================================================================

    fn config_updated(
        &mut self,
        config_id: ConfigId,
        properties: ConfigProperties,
    ) -> Result<(), CoordinatorError> {
        if self.shutting_down {
            debug!(%config_id, "Ignoring configuration update during shutdown");
            return Ok(());
        }
        self.statuses
            .insert(config_id.clone(), WorkloadStatus::Pending);

        let record = match ConfigRecord::parse(config_id.clone(), properties) {
            Ok(record) => {
                self.invalid.remove(&config_id);
                record
            }
            Err(invalid) => {
                warn!(%config_id, missing = ?invalid.missing, "Invalid application configuration");
                if self.invalid.insert(config_id.clone()) {
                    self.diagnostics.push(Diagnostic::InvalidConfig {
                        config_id: config_id.clone(),
                        missing: invalid.missing.iter().map(|m| m.to_string()).collect(),
                    });
                }
                self.statuses.insert(config_id, WorkloadStatus::Unconfigured);
                return Ok(());
            }
        };

        let guard = self.join_episode();
        let result = self.apply_record(record);
        drop(guard);
        result
    }

    fn apply_record(&mut self, record: ConfigRecord) -> Result<(), CoordinatorError> {
        match self.identities.classify(&record) {
            Resolution::Create => self.create_identity(record),
            Resolution::Update(id) => {
                self.update_identity(id, record);
                Ok(())
            }
            Resolution::Departing(id) => {
                let name = self.name_of(id)?;
                debug!(config_id = %record.config_id, %name, "Deferred until the departing application is removed");
                self.identities.defer(record);
                Ok(())
            }
            Resolution::Rename(id) => {
                let old_name = self.name_of(id)?;
                info!(
                    config_id = %record.config_id,
                    from = %old_name,
                    to = %record.name,
                    "Application renamed"
                );
                self.identities.defer(record);
                let guard = self.join_episode();
                self.uninstall(id, false, guard);
                Ok(())
            }
            Resolution::RenameConflict { identity, owner } => {
                let name = record.name.clone();
                self.report_duplicate(&record, owner);
                self.identities.block(record, &name);
                let guard = self.join_episode();
                self.uninstall(identity, false, guard);
                Ok(())
            }
            Resolution::Duplicate { owner } => {
                let owner_departing = self
                    .identities
                    .get(owner)
                    .map(WorkloadIdentity::is_departing)
                    .unwrap_or(false);
                let name = record.name.clone();
                if !owner_departing {
                    self.report_duplicate(&record, owner);
                }
                self.identities.block(record, &name);
                Ok(())
            }
        }
    }

    fn name_of(&self, id: IdentityId) -> Result<String, CoordinatorError> {
        self.identities
            .get(id)
            .map(|identity| identity.name.clone())
            .ok_or_else(|| CoordinatorError::InvariantViolation(format!("{id} is mapped but missing")))
    }

    fn report_duplicate(&mut self, record: &ConfigRecord, owner: IdentityId) {
        let Some(owner_config) = self.identities.get(owner).map(|o| o.config_id().clone()) else {
            return;
        };
        warn!(
            name = %record.name,
            config_id = %record.config_id,
            owner = %owner_config,
            "Duplicate application name"
        );
        self.diagnostics.push(Diagnostic::DuplicateName {
            name: record.name.clone(),
            config_id: record.config_id.clone(),
            owner: owner_config,
        });
        self.statuses
            .insert(record.config_id.clone(), WorkloadStatus::DuplicateName);
    }

    fn create_identity(&mut self, record: ConfigRecord) -> Result<(), CoordinatorError> {
        let id = self.identities.allocate_id();
        let reporter = PhaseReporter::new(
            self.sender.clone(),
            id,
            record.name.clone(),
            record.config_id.clone(),
        );
        let machine = self.factory.create(&record, reporter);
        info!(%id, name = %record.name, config_id = %record.config_id, app_type = %record.app_type, "Created");
        self.identities.insert(WorkloadIdentity {
            id,
            name: record.name.clone(),
            type_key: record.app_type.clone(),
            config: record,
            state_machine: Some(machine),
            retiring: None,
            phase: None,
            recycle_context: None,
            clean_cache_on_removal: false,
        })?;
        self.bind_and_configure(id);
        Ok(())
    }

    fn update_identity(&mut self, id: IdentityId, record: ConfigRecord) {
        let Some(identity) = self.identities.get_mut(id) else {
            return;
        };
        debug!(%id, name = %identity.name, config_id = %record.config_id, "Updated");
        identity.config = record;
        let context = identity.recycle_context.clone();

        if let Some(context) = context {
            let dependents = self.ids_for_names(self.recycle.dependents_of(&context));
            if !dependents.is_empty() {
                info!(%context, count = dependents.len(), "Recycling dependents of updated provider");
                let guard = self.join_episode();
                self.recycle_apps(&dependents, false);
                drop(guard);
            }
        }
        self.bind_and_configure(id);
    }

    fn bind_and_configure(&mut self, id: IdentityId) {
        let Some(identity) = self.identities.get_mut(id) else {
            return;
        };
        identity.type_key = identity.config.app_type.clone();
        let type_key = identity.type_key.clone();

        self.types.forget(id);
        let handler = self.types.bind(&type_key, id);
        if handler.is_none() {
            debug!(%id, app_type = %type_key, "Waiting for type handler");
        }
        if let Some(machine) = self.machine(id) {
            machine.set_app_handler(handler);
        }

        let guard = self.join_episode();
        self.configure_app(id);
        drop(guard);
    }

    fn configure_app(&mut self, id: IdentityId) {
        let Some(episode) = self.episode.as_mut() else {
            return;
        };
        let Some(identity) = self.identities.get(id) else {
            return;
        };
        let Some(machine) = identity.state_machine.as_ref() else {
            return;
        };
        let record = &identity.config;
        let is_rar = identity.type_key == self.rar_type;

        let gating = type_gating(is_rar, &self.ready, &self.rar_support, episode);
        let start_after = start_after_signals(&self.identities, &mut self.graph, record, None);
        let stopped = episode.stopped_signal(record);
        let starting = Signal::new(format!("resolves when the {} is starting", record.label()));
        let install_called = Signal::new(format!(
            "resolves when install has been called for the {}",
            record.label()
        ));
        episode.track_install_called(install_called.clone(), id);
        let started = Signal::new(format!("resolves when the {} has started", record.label()));
        if is_rar {
            episode.track_rar_started(started.clone());
        }

        let (fail_started, release_install) = (started.clone(), install_called.clone());
        starting.on_completion(move |outcome| {
            if let Err(e) = outcome {
                fail_started.fail(e.clone());
                release_install.succeed();
            }
        });
        chain_install_failure(&install_called, &started);

        debug!(
            %id,
            name = %identity.name,
            episode = episode.id(),
            start_after = start_after.len(),
            "Configuring"
        );
        machine.configure(
            record,
            ConfigureSignals {
                gating,
                start_after,
                stopped,
                starting,
                install_called,
                started,
            },
        );
    }

    fn config_deleted(&mut self, config_id: ConfigId) -> Result<(), CoordinatorError> {
        if self.shutting_down {
            debug!(%config_id, "Ignoring configuration removal during shutdown");
            return Ok(());
        }
        let was_blocked = self.identities.unblock(&config_id).is_some();
        let was_invalid = self.invalid.remove(&config_id);

        let Some(id) = self.identities.bound_for_delete(&config_id)? else {
            if was_blocked || was_invalid {
                debug!(%config_id, "Dropped unbound configuration");
                self.statuses.insert(config_id, WorkloadStatus::Removed);
            } else {
                debug!(%config_id, "Removal of unknown configuration ignored");
            }
            return Ok(());
        };

        if let Some(identity) = self.identities.get_mut(id) {
            if identity.is_departing() {
                debug!(%id, "Already uninstalling, cache will be cleaned");
                identity.clean_cache_on_removal = true;
                return Ok(());
            }
        }
        let guard = self.join_episode();
        self.uninstall(id, true, guard);
        Ok(())
    }

    /// Asks the state machine to uninstall. The identity leaves the maps when
    /// `removed` resolves; `hold` is released only after that.
    fn uninstall(&mut self, id: IdentityId, clean_cache: bool, hold: Option<EpisodeRef>) {
        let Some(identity) = self.identities.get_mut(id) else {
            return;
        };
        identity.clean_cache_on_removal |= clean_cache;
        let Some(machine) = identity.state_machine.take() else {
            return;
        };
        info!(%id, name = %identity.name, config_id = %identity.config_id(), "Uninstalling");

        let removed = Signal::new(format!(
            "resolves when the {} has been removed",
            identity.config.label()
        ));
        let sender = self.sender.clone();
        removed.on_completion(move |outcome| {
            let _ = sender.send(Command::IdentityRemoved {
                identity: id,
                outcome: outcome.clone(),
                guard: hold,
            });
        });
        machine.uninstall(removed);
        identity.retiring = Some(machine);
        self.types.forget(id);
    }

    fn identity_removed(
        &mut self,
        id: IdentityId,
        outcome: Outcome,
        guard: Option<EpisodeRef>,
    ) -> Result<(), CoordinatorError> {
        if let Err(e) = outcome {
            warn!(%id, error = %e, "Uninstall failed, application left in place");
            return Ok(());
        }
        let Some(identity) = self.identities.remove(id) else {
            trace!(%id, "Removal for unknown application");
            return Ok(());
        };
        self.types.forget(id);
        let config_id = identity.config_id().clone();
        info!(%id, name = %identity.name, %config_id, "Removed");
        self.statuses
            .insert(config_id.clone(), WorkloadStatus::Removed);
        self.bus.publish(EventKind::WorkloadRemoved {
            name: identity.name.clone(),
            config_id: config_id.clone(),
        });
        if identity.clean_cache_on_removal {
            if let Some(root) = &self.cache_root {
                cache::clean_config_dirs(root, &config_id);
            }
        }

        let mut result = self.replay_blocked(&identity.name);
        if result.is_ok() {
            if let Some(record) = self.identities.take_deferred(&config_id) {
                info!(%config_id, name = %record.name, "Applying deferred configuration");
                self.statuses
                    .insert(config_id.clone(), WorkloadStatus::Pending);
                result = self.apply_record(record);
            }
        }
        drop(guard);
        result
    }

    fn replay_blocked(&mut self, name: &str) -> Result<(), CoordinatorError> {
        while self.identities.id_for_name(name).is_none() {
            let Some(record) = self.identities.pop_blocked(name) else {
                break;
            };
            info!(%name, config_id = %record.config_id, "Replaying blocked configuration");
            self.statuses
                .insert(record.config_id.clone(), WorkloadStatus::Pending);
            self.apply_record(record)?;
        }
        Ok(())
    }

    // =====================================================================
    // Recycling
    // =====================================================================

    /// Re-arms the given workloads in the current episode. Each workload is
    /// recycled at most once per episode.
    fn recycle_apps(&mut self, targets: &BTreeSet<IdentityId>, handler_removed: bool) {
        let Some(episode) = self.episode.as_mut() else {
            return;
        };
        for &id in targets {
            let Some(identity) = self.identities.get(id) else {
                continue;
            };
            let Some(machine) = identity.state_machine.as_ref() else {
                continue;
            };
            if episode.has_stopped_signal(identity.config_id()) {
                continue;
            }
            let record = &identity.config;
            let is_rar = identity.type_key == self.rar_type;

            let mut gating = type_gating(is_rar, &self.ready, &self.rar_support, episode);
            if !handler_removed {
                gating.extend(start_after_signals(
                    &self.identities,
                    &mut self.graph,
                    record,
                    Some(targets),
                ));
            }
            let stopped = episode.stopped_signal(record);
            let install_called = Signal::new(format!(
                "resolves when install has been called for the {}",
                record.label()
            ));
            episode.track_install_called(install_called.clone(), id);
            let started = is_rar.then(|| {
                let started =
                    Signal::new(format!("resolves when the {} has started", record.label()));
                episode.track_rar_started(started.clone());
                chain_install_failure(&install_called, &started);
                started
            });

            debug!(%id, name = %identity.name, handler_removed, "Recycling");
            if handler_removed {
                machine.set_app_handler(None);
            }
            machine.recycle(RecycleSignals {
                gating,
                stopped,
                install_called,
                started,
            });
        }
    }

    fn recycle_applications(&mut self, names: Option<Vec<String>>) {
        let targets: BTreeSet<IdentityId> = match names {
            Some(names) => self.ids_for_names(names),
            None => self.identities.ids().into_iter().collect(),
        };
        info!(count = targets.len(), "Recycling applications");
        let guard = self.join_episode();
        self.recycle_apps(&targets, false);
        drop(guard);
    }

    /// Restarts every configured workload behind the latest feature signal.
    fn restart_apps(&mut self, guard: EpisodeRef) {
        let Some(episode) = self.episode.as_mut() else {
            return;
        };
        let feature = self
            .feature_ready
            .clone()
            .unwrap_or_else(|| Signal::resolved("feature updates completed", Ok(true)));
        let mut count = 0usize;
        for identity in self.identities.iter() {
            if !identity.is_configured() {
                continue;
            }
            let Some(machine) = identity.state_machine.as_ref() else {
                continue;
            };
            let record = &identity.config;
            let is_rar = identity.type_key == self.rar_type;

            let mut gating = vec![feature.clone()];
            gating.extend(type_gating(is_rar, &self.ready, &self.rar_support, episode));
            gating.extend(start_after_signals(
                &self.identities,
                &mut self.graph,
                record,
                None,
            ));
            let stopped = episode.stopped_signal(record);
            let install_called = Signal::new(format!(
                "resolves when install has been called for the {}",
                record.label()
            ));
            episode.track_install_called(install_called.clone(), identity.id);
            let started = is_rar.then(|| {
                let started =
                    Signal::new(format!("resolves when the {} has started", record.label()));
                episode.track_rar_started(started.clone());
                chain_install_failure(&install_called, &started);
                started
            });
            machine.recycle(RecycleSignals {
                gating,
                stopped,
                install_called,
                started,
            });
            count += 1;
        }
        info!(episode = episode.id(), count, "Force restarting applications");
        episode.apps_stopped.on_completion(move |_| drop(guard));
        episode.begin_stopping();
    }

    fn recycle_context_set(&mut self, context: RecycleContext) {
        debug!(context = %context.id, owner = ?context.owner, "Context set");
        if let Some(owner) = &context.owner {
            if let Some(identity) = self
                .identities
                .id_for_name(owner)
                .and_then(|id| self.identities.get_mut(id))
            {
                identity.recycle_context = Some(context.id.clone());
            }
        }
        self.recycle.set_context(context);
    }

    fn recycle_context_unset(&mut self, context: RecycleContext) {
        let Some(guard) = self.join_episode() else {
            return;
        };
        match self.recycle.unset_context(&context.id) {
            ContextRemoval::Unknown => {
                debug!(context = %context.id, "Unset of unknown context ignored");
                if let Some(stopped) = &context.apps_stopped {
                    stopped.succeed();
                }
            }
            ContextRemoval::Pending => {
                debug!(context = %context.id, "Context pending until its components are gone");
                if let Some(episode) = self.episode.as_mut() {
                    episode.hold_context(&context, guard);
                }
            }
            ContextRemoval::Drained => {
                if let Some(episode) = self.episode.as_mut() {
                    episode.hold_context(&context, guard);
                }
                self.drop_context_reference(&context.id);
            }
        }
    }

    fn recycle_component_unset(&mut self, component: RecycleComponent) {
        let guard = self.join_episode();
        debug!(component = %component.id, "Component unset");
        for context in self.recycle.unset_component(&component) {
            self.drop_context_reference(&context);
        }
        let dependents = self.ids_for_names(component.dependents.iter().cloned());
        if !dependents.is_empty() {
            self.recycle_apps(&dependents, false);
        }
        drop(guard);
    }

    fn drop_context_reference(&mut self, context: &ContextId) {
        let Some(guard) = self
            .episode
            .as_mut()
            .and_then(|episode| episode.release_context(context))
        else {
            return;
        };
        info!(%context, episode = guard.episode(), "Context released");
        self.bus.publish(EventKind::ContextReleased {
            context: context.to_string(),
        });
        drop(guard);
    }

    // =====================================================================
    // Type support
    // =====================================================================

    fn type_supported(&mut self, app_type: &str) {
        debug!(%app_type, "Type supported");
        self.types.entry(app_type).supported = true;
        if app_type == self.rar_type {
            self.rar_support.succeed();
        }
        self.notify_waiting(app_type);
    }

    fn notify_waiting(&mut self, app_type: &str) {
        let Some((handler, waiting)) = self.types.release_waiting(app_type) else {
            return;
        };
        for id in waiting {
            let Some(identity) = self.identities.get(id) else {
                continue;
            };
            if identity.type_key != app_type {
                continue;
            }
            if let Some(machine) = identity.state_machine.as_ref() {
                debug!(%id, name = %identity.name, "Handler bound");
                machine.set_app_handler(Some(handler.clone()));
            }
        }
    }

    fn type_handler_unavailable(&mut self, app_type: &str) -> Result<(), CoordinatorError> {
        if self.types.get(app_type).is_none() {
            return Err(CoordinatorError::UnknownType(app_type.to_string()));
        }
        let affected: BTreeSet<IdentityId> = self
            .identities
            .iter()
            .filter(|i| i.type_key == app_type && !i.is_departing())
            .map(|i| i.id)
            .collect();
        info!(%app_type, affected = affected.len(), "Handler unavailable");

        let support = self.types.entry(app_type);
        support.handler = None;
        support.waiting.extend(affected.iter().copied());

        let guard = self.join_episode();
        if app_type == self.rar_type {
            if let Some(episode) = &self.episode {
                episode.rars_have_started.succeed();
            }
        }
        self.recycle_apps(&affected, true);
        drop(guard);
        Ok(())
    }

    // =====================================================================
    // Runtime
    // =====================================================================

    fn runtime_notification(&mut self, kind: RuntimeNotification, signal: Signal) {
        debug!(?kind, signal = %signal, "Runtime notification");
        match kind {
            RuntimeNotification::FeatureUpdatesCompleted
            | RuntimeNotification::ConfigUpdatesDelivered
            | RuntimeNotification::OrbStarted => {
                if kind == RuntimeNotification::FeatureUpdatesCompleted {
                    self.feature_ready = Some(signal.clone());
                }
                if let Some(guard) = self.join_episode() {
                    signal.on_completion(move |_| drop(guard));
                }
            }
            RuntimeNotification::AppForceRestart => {
                let Some(guard) = self.join_episode() else {
                    return;
                };
                let sender = self.sender.clone();
                signal.on_completion(move |outcome| {
                    if matches!(outcome, Ok(true)) {
                        let _ = sender.send(Command::RestartAll { guard });
                    }
                });
            }
        }
    }

    fn runtime_shutting_down(&mut self) -> Vec<Signal> {
        if self.shutting_down {
            return Vec::new();
        }
        self.shutting_down = true;
        let identities = self.identities.clear();
        info!(workloads = identities.len(), "Runtime shutting down");

        if let Some(root) = &self.cache_root {
            let active: HashSet<ConfigId> = identities
                .iter()
                .filter(|identity| !identity.is_departing())
                .map(|identity| identity.config_id().clone())
                .collect();
            let removed = cache::clean_stale(root, &active);
            debug!(removed, "Stale caches removed");
        }

        let mut removals = Vec::new();
        for mut identity in identities {
            if let Some(machine) = identity.state_machine.take() {
                let removed = Signal::new(format!(
                    "resolves when the {} has been removed",
                    identity.config.label()
                ));
                machine.uninstall(removed.clone());
                removals.push(removed);
                self.retired.push(machine);
            }
            if let Some(machine) = identity.retiring.take() {
                self.retired.push(machine);
            }
        }

        if let Some(episode) = self.episode.take() {
            debug!(episode = episode.id(), "Episode abandoned");
            episode.deactivate();
        }
        removals
    }

    // =====================================================================
    // Phases
    // =====================================================================

    fn phase_changed(&mut self, id: IdentityId, phase: Phase) {
        let Some(identity) = self.identities.get_mut(id) else {
            trace!(%id, %phase, "Phase report for removed application");
            return;
        };
        let old = identity.phase.unwrap_or(Phase::Installed);
        identity.phase = Some(phase);
        if old != phase {
            info!(name = %identity.name, %old, new = %phase, "Phase changed");
            self.bus.publish(EventKind::PhaseTransition {
                name: identity.name.clone(),
                config_id: identity.config_id().clone(),
                old,
                new: phase,
            });
        }
        if phase == Phase::Started {
            let config_id = identity.config_id().clone();
            self.graph.unblock(&config_id);
            self.statuses.insert(config_id, WorkloadStatus::Started);
        }
    }

    fn start_failed(&mut self, id: IdentityId, reason: String) {
        let Some(identity) = self.identities.get(id) else {
            return;
        };
        warn!(name = %identity.name, %reason, "Application failed to start");
        self.statuses
            .insert(identity.config_id().clone(), WorkloadStatus::Failed);
    }

    // =====================================================================
    // Management
    // =====================================================================

    fn machine(&self, id: IdentityId) -> Option<&dyn StateMachine> {
        self.identities
            .get(id)
            .and_then(|identity| identity.state_machine.as_deref())
    }

    fn with_machine(
        &self,
        name: &str,
        action: impl FnOnce(&dyn StateMachine),
    ) -> Result<(), CoordinatorError> {
        if self.shutting_down {
            return Err(CoordinatorError::ShuttingDown);
        }
        let machine = self
            .identities
            .id_for_name(name)
            .and_then(|id| self.machine(id))
            .ok_or_else(|| CoordinatorError::UnknownApplication(name.to_string()))?;
        action(machine);
        Ok(())
    }

    fn ids_for_names(&self, names: impl IntoIterator<Item = String>) -> BTreeSet<IdentityId> {
        names
            .into_iter()
            .filter_map(|name| self.identities.id_for_name(&name))
            .collect()
    }

    fn workloads(&self) -> Vec<WorkloadSummary> {
        let mut summaries: Vec<WorkloadSummary> = self
            .identities
            .iter()
            .map(|identity| WorkloadSummary {
                name: identity.name.clone(),
                config_id: identity.config_id().clone(),
                app_type: identity.type_key.clone(),
                phase: identity.phase,
                status: self.statuses.get(identity.config_id()).copied(),
                departing: identity.is_departing(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    fn describe(&self) -> String {
        let mut out = String::new();
        for summary in self.workloads() {
            let phase = summary
                .phase
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unconfigured".to_string());
            let _ = write!(
                out,
                "{} [{}] type={} phase={}",
                summary.name, summary.config_id, summary.app_type, phase
            );
            if let Some(status) = summary.status {
                let _ = write!(out, " status={status}");
            }
            if summary.departing {
                out.push_str(" (uninstalling)");
            }
            out.push('\n');
        }
        if out.is_empty() {
            out.push_str("no applications\n");
        }
        out
    }

    fn dump_applications(&self) {
        if tracing::enabled!(Level::DEBUG) {
            debug!(applications = %self.describe(), "Applications");
        }
    }
}

fn type_gating(is_rar: bool, ready: &Signal, rar_support: &Signal, episode: &Episode) -> Vec<Signal> {
    if is_rar {
        vec![rar_support.clone(), episode.apps_starting.clone()]
    } else {
        vec![ready.clone(), episode.rars_have_started.clone()]
    }
}

/// One signal per existing dependency that has not started yet, or that is
/// itself being recycled.
fn start_after_signals(
    identities: &IdentityTable,
    graph: &mut StartAfterGraph,
    record: &ConfigRecord,
    recycling: Option<&BTreeSet<IdentityId>>,
) -> Vec<Signal> {
    record
        .start_after
        .iter()
        .filter_map(|dep| {
            let dependency = identities.by_config(dep)?;
            let restarting = recycling.is_some_and(|set| set.contains(&dependency.id));
            if dependency.is_started() && !restarting {
                return None;
            }
            Some(graph.register(
                dep,
                format!("resolves when the {} has started", dependency.config.label()),
            ))
        })
        .collect()
}

fn chain_install_failure(install_called: &Signal, started: &Signal) {
    let started = started.clone();
    install_called.on_completion(move |outcome| {
        if let Err(e) = outcome {
            started.fail(e.clone());
        }
    });
}
