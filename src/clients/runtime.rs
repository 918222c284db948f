use crate::clients::access::CoordinatorAccess;
use crate::coordinator::{CoordinatorClient, CoordinatorError, EpisodeSignals, RuntimeNotification};
use crate::model::{RecycleComponent, RecycleContext};
use crate::workload::AppHandler;
use async_trait::async_trait;
use signal_framework::Signal;
use tracing::{debug, instrument};

/// Client used by the surrounding runtime: readiness, type support, shared
/// resources and shutdown.
#[derive(Clone, Debug)]
pub struct RuntimeClient {
    inner: CoordinatorClient,
}

impl RuntimeClient {
    pub fn new(inner: CoordinatorClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CoordinatorAccess for RuntimeClient {
    type Error = CoordinatorError;

    fn inner(&self) -> &CoordinatorClient {
        &self.inner
    }
}

impl RuntimeClient {
    #[instrument(skip(self))]
    pub async fn ready_to_start(&self) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.runtime_ready_to_start().await
    }

    /// Holds the current episode open until `signal` resolves. The latest
    /// such signal also gates every episode's start phase.
    #[instrument(skip(self, signal), fields(signal = %signal))]
    pub async fn feature_updates(&self, signal: Signal) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner
            .runtime_notification(RuntimeNotification::FeatureUpdatesCompleted, signal)
            .await
    }

    #[instrument(skip(self, signal), fields(signal = %signal))]
    pub async fn orb_started(&self, signal: Signal) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner
            .runtime_notification(RuntimeNotification::OrbStarted, signal)
            .await
    }

    /// Restarts every configured workload once `signal` succeeds.
    #[instrument(skip(self, signal), fields(signal = %signal))]
    pub async fn force_restart(&self, signal: Signal) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner
            .runtime_notification(RuntimeNotification::AppForceRestart, signal)
            .await
    }

    #[instrument(skip(self))]
    pub async fn type_supported(&self, app_type: &str) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.type_supported(app_type).await
    }

    #[instrument(skip(self))]
    pub async fn type_unsupported(&self, app_type: &str) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.type_unsupported(app_type).await
    }

    #[instrument(skip(self))]
    pub async fn handler_available(&self, handler: AppHandler) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.type_handler_available(handler).await
    }

    #[instrument(skip(self))]
    pub async fn handler_unavailable(&self, app_type: &str) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.type_handler_unavailable(app_type).await
    }

    #[instrument(skip(self, context), fields(context = %context.id))]
    pub async fn context_set(&self, context: RecycleContext) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.recycle_context_set(context).await
    }

    #[instrument(skip(self, context), fields(context = %context.id))]
    pub async fn context_unset(&self, context: RecycleContext) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.recycle_context_unset(context).await
    }

    #[instrument(skip(self, component), fields(component = %component.id))]
    pub async fn component_set(&self, component: RecycleComponent) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.recycle_component_set(component).await
    }

    #[instrument(skip(self, component), fields(component = %component.id))]
    pub async fn component_unset(
        &self,
        component: RecycleComponent,
    ) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.recycle_component_unset(component).await
    }

    #[instrument(skip(self))]
    pub async fn episode_signals(&self) -> Result<Option<EpisodeSignals>, CoordinatorError> {
        debug!("Sending request");
        self.inner.episode_signals().await
    }

    /// Tears every workload down. The returned signals resolve as each
    /// workload finishes uninstalling.
    #[instrument(skip(self))]
    pub async fn shutting_down(&self) -> Result<Vec<Signal>, CoordinatorError> {
        debug!("Sending request");
        self.inner.runtime_shutting_down().await
    }
}
