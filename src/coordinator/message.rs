//! # Coordinator Messages
//!
//! Everything the coordinator actor does starts as a [`Command`]. Public
//! commands carry a `respond_to` channel and are sent by
//! [`CoordinatorClient`](crate::coordinator::CoordinatorClient). Internal
//! commands are sent by signal listeners, episode guards and phase reporters
//! so that every state change happens inside the actor's loop.

use crate::coordinator::episode::{EpisodeId, EpisodeRef, EpisodeSignals};
use crate::coordinator::error::CoordinatorError;
use crate::coordinator::identity::IdentityId;
use crate::model::{
    ConfigId, ConfigProperties, Diagnostic, Phase, RecycleComponent, RecycleContext, WorkloadStatus,
};
use crate::workload::AppHandler;
use serde::Serialize;
use signal_framework::{Outcome, Signal};
use tokio::sync::oneshot;

/// One-shot response channel used by the coordinator.
pub type Response<T> = oneshot::Sender<Result<T, CoordinatorError>>;

/// Named readiness notifications from the surrounding runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeNotification {
    /// Runtime features finished updating. Starts wait for this.
    FeatureUpdatesCompleted,
    /// The configuration source delivered its current batch.
    ConfigUpdatesDelivered,
    /// The object request broker is up.
    OrbStarted,
    /// Shared infrastructure was reprovisioned; restart every workload.
    AppForceRestart,
}

/// Structured view of one workload for management tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadSummary {
    pub name: String,
    pub config_id: ConfigId,
    pub app_type: String,
    pub phase: Option<Phase>,
    pub status: Option<WorkloadStatus>,
    pub departing: bool,
}

#[derive(Debug)]
pub enum Command {
    // Configuration source
    ConfigUpdated {
        config_id: ConfigId,
        properties: ConfigProperties,
        respond_to: Response<()>,
    },
    ConfigDeleted {
        config_id: ConfigId,
        respond_to: Response<()>,
    },

    // Type support
    TypeSupported {
        app_type: String,
        respond_to: Response<()>,
    },
    TypeUnsupported {
        app_type: String,
        respond_to: Response<()>,
    },
    TypeHandlerAvailable {
        handler: AppHandler,
        respond_to: Response<()>,
    },
    TypeHandlerUnavailable {
        app_type: String,
        respond_to: Response<()>,
    },

    // Shared resources
    RecycleContextSet {
        context: RecycleContext,
        respond_to: Response<()>,
    },
    RecycleContextUnset {
        context: RecycleContext,
        respond_to: Response<()>,
    },
    RecycleComponentSet {
        component: RecycleComponent,
        respond_to: Response<()>,
    },
    RecycleComponentUnset {
        component: RecycleComponent,
        respond_to: Response<()>,
    },
    /// `None` recycles every workload.
    RecycleApplications {
        names: Option<Vec<String>>,
        respond_to: Response<()>,
    },

    // Runtime
    RuntimeNotification {
        kind: RuntimeNotification,
        signal: Signal,
        respond_to: Response<()>,
    },
    RuntimeReadyToStart {
        respond_to: Response<()>,
    },
    RuntimeShuttingDown {
        respond_to: Response<Vec<Signal>>,
    },
    JoinEpisode {
        respond_to: Response<Option<EpisodeRef>>,
    },
    EpisodeSignals {
        respond_to: Response<Option<EpisodeSignals>>,
    },

    // Management
    Start {
        name: String,
        respond_to: Response<()>,
    },
    Stop {
        name: String,
        respond_to: Response<()>,
    },
    Restart {
        name: String,
        respond_to: Response<()>,
    },
    Describe {
        respond_to: Response<String>,
    },
    Workloads {
        respond_to: Response<Vec<WorkloadSummary>>,
    },
    Status {
        config_id: ConfigId,
        respond_to: Response<Option<WorkloadStatus>>,
    },
    Diagnostics {
        respond_to: Response<Vec<Diagnostic>>,
    },

    // Internal
    PhaseChanged {
        identity: IdentityId,
        phase: Phase,
    },
    StartFailed {
        identity: IdentityId,
        reason: String,
    },
    EpisodeQuiesced {
        episode: EpisodeId,
    },
    EpisodeStopped {
        episode: EpisodeId,
        outcome: Outcome,
    },
    IdentityRemoved {
        identity: IdentityId,
        outcome: Outcome,
        guard: Option<EpisodeRef>,
    },
    RestartAll {
        guard: EpisodeRef,
    },
    /// Re-queues itself until the mailbox is empty, at most `remaining`
    /// times, then answers.
    Settle {
        remaining: u32,
        respond_to: oneshot::Sender<()>,
    },
    Shutdown,
}
