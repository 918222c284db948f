//! # Coordinator Client
//!
//! The cloneable handle through which every collaborator talks to the
//! coordinator actor. Each call sends one [`Command`] with a oneshot responder
//! and awaits the answer.

use crate::coordinator::episode::{EpisodeRef, EpisodeSignals};
use crate::coordinator::error::CoordinatorError;
use crate::coordinator::events::{Bus, CoordinatorEvent};
use crate::coordinator::message::{Command, Response, RuntimeNotification, WorkloadSummary};
use crate::model::{
    ConfigId, ConfigProperties, Diagnostic, RecycleComponent, RecycleContext, WorkloadStatus,
};
use crate::workload::AppHandler;
use signal_framework::Signal;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Upper bound on the rounds [`CoordinatorClient::settle`] re-queues itself
/// while the mailbox is still busy. Reaching it answers anyway and logs.
pub const SETTLE_LIMIT: u32 = 4096;

#[derive(Clone, Debug)]
pub struct CoordinatorClient {
    sender: mpsc::UnboundedSender<Command>,
    bus: Bus,
}

impl CoordinatorClient {
    pub(crate) fn new(sender: mpsc::UnboundedSender<Command>, bus: Bus) -> Self {
        Self { sender, bus }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Response<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .map_err(|_| CoordinatorError::ActorClosed)?;
        response.await.map_err(|_| CoordinatorError::ActorDropped)?
    }

    pub async fn config_updated(
        &self,
        config_id: impl Into<ConfigId>,
        properties: ConfigProperties,
    ) -> Result<(), CoordinatorError> {
        let config_id = config_id.into();
        self.request(|respond_to| Command::ConfigUpdated {
            config_id,
            properties,
            respond_to,
        })
        .await
    }

    pub async fn config_deleted(&self, config_id: impl Into<ConfigId>) -> Result<(), CoordinatorError> {
        let config_id = config_id.into();
        self.request(|respond_to| Command::ConfigDeleted {
            config_id,
            respond_to,
        })
        .await
    }

    pub async fn type_supported(&self, app_type: impl Into<String>) -> Result<(), CoordinatorError> {
        let app_type = app_type.into();
        self.request(|respond_to| Command::TypeSupported {
            app_type,
            respond_to,
        })
        .await
    }

    pub async fn type_unsupported(&self, app_type: impl Into<String>) -> Result<(), CoordinatorError> {
        let app_type = app_type.into();
        self.request(|respond_to| Command::TypeUnsupported {
            app_type,
            respond_to,
        })
        .await
    }

    pub async fn type_handler_available(&self, handler: AppHandler) -> Result<(), CoordinatorError> {
        self.request(|respond_to| Command::TypeHandlerAvailable {
            handler,
            respond_to,
        })
        .await
    }

    pub async fn type_handler_unavailable(
        &self,
        app_type: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        let app_type = app_type.into();
        self.request(|respond_to| Command::TypeHandlerUnavailable {
            app_type,
            respond_to,
        })
        .await
    }

    pub async fn recycle_context_set(&self, context: RecycleContext) -> Result<(), CoordinatorError> {
        self.request(|respond_to| Command::RecycleContextSet {
            context,
            respond_to,
        })
        .await
    }

    pub async fn recycle_context_unset(&self, context: RecycleContext) -> Result<(), CoordinatorError> {
        self.request(|respond_to| Command::RecycleContextUnset {
            context,
            respond_to,
        })
        .await
    }

    pub async fn recycle_component_set(
        &self,
        component: RecycleComponent,
    ) -> Result<(), CoordinatorError> {
        self.request(|respond_to| Command::RecycleComponentSet {
            component,
            respond_to,
        })
        .await
    }

    pub async fn recycle_component_unset(
        &self,
        component: RecycleComponent,
    ) -> Result<(), CoordinatorError> {
        self.request(|respond_to| Command::RecycleComponentUnset {
            component,
            respond_to,
        })
        .await
    }

    /// Forces a restart of the named workloads, or of every workload.
    pub async fn recycle_applications(
        &self,
        names: Option<Vec<String>>,
    ) -> Result<(), CoordinatorError> {
        self.request(|respond_to| Command::RecycleApplications { names, respond_to })
            .await
    }

    pub async fn runtime_notification(
        &self,
        kind: RuntimeNotification,
        signal: Signal,
    ) -> Result<(), CoordinatorError> {
        self.request(|respond_to| Command::RuntimeNotification {
            kind,
            signal,
            respond_to,
        })
        .await
    }

    pub async fn runtime_ready_to_start(&self) -> Result<(), CoordinatorError> {
        self.request(|respond_to| Command::RuntimeReadyToStart { respond_to })
            .await
    }

    /// Returns one removal signal per workload that was still installed.
    pub async fn runtime_shutting_down(&self) -> Result<Vec<Signal>, CoordinatorError> {
        self.request(|respond_to| Command::RuntimeShuttingDown { respond_to })
            .await
    }

    /// A reference on the current episode, opening one if needed. `None` once
    /// the runtime is shutting down.
    pub async fn join_episode(&self) -> Result<Option<EpisodeRef>, CoordinatorError> {
        self.request(|respond_to| Command::JoinEpisode { respond_to })
            .await
    }

    pub async fn episode_signals(&self) -> Result<Option<EpisodeSignals>, CoordinatorError> {
        self.request(|respond_to| Command::EpisodeSignals { respond_to })
            .await
    }

    pub async fn start(&self, name: impl Into<String>) -> Result<(), CoordinatorError> {
        let name = name.into();
        self.request(|respond_to| Command::Start { name, respond_to })
            .await
    }

    pub async fn stop(&self, name: impl Into<String>) -> Result<(), CoordinatorError> {
        let name = name.into();
        self.request(|respond_to| Command::Stop { name, respond_to })
            .await
    }

    pub async fn restart(&self, name: impl Into<String>) -> Result<(), CoordinatorError> {
        let name = name.into();
        self.request(|respond_to| Command::Restart { name, respond_to })
            .await
    }

    pub async fn describe(&self) -> Result<String, CoordinatorError> {
        self.request(|respond_to| Command::Describe { respond_to })
            .await
    }

    pub async fn workloads(&self) -> Result<Vec<WorkloadSummary>, CoordinatorError> {
        self.request(|respond_to| Command::Workloads { respond_to })
            .await
    }

    pub async fn status(
        &self,
        config_id: impl Into<ConfigId>,
    ) -> Result<Option<WorkloadStatus>, CoordinatorError> {
        let config_id = config_id.into();
        self.request(|respond_to| Command::Status {
            config_id,
            respond_to,
        })
        .await
    }

    pub async fn diagnostics(&self) -> Result<Vec<Diagnostic>, CoordinatorError> {
        self.request(|respond_to| Command::Diagnostics { respond_to })
            .await
    }

    /// Events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.bus.subscribe()
    }

    /// Waits until the coordinator has processed everything queued so far,
    /// including the follow-up work that processing schedules.
    ///
    /// The barrier answers once it reaches the actor with an empty mailbox.
    /// Work that is still pending outside the actor (an unresolved signal, a
    /// spawned task) is not waited for.
    pub async fn settle(&self) -> Result<(), CoordinatorError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::Settle {
                remaining: SETTLE_LIMIT,
                respond_to,
            })
            .map_err(|_| CoordinatorError::ActorClosed)?;
        response.await.map_err(|_| CoordinatorError::ActorDropped)
    }

    /// Asks the actor loop to exit after the commands already queued.
    pub fn close(&self) -> Result<(), CoordinatorError> {
        self.sender
            .send(Command::Shutdown)
            .map_err(|_| CoordinatorError::ActorClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
