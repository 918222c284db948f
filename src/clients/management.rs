use crate::clients::access::CoordinatorAccess;
use crate::coordinator::{
    CoordinatorClient, CoordinatorError, CoordinatorEvent, WorkloadSummary,
};
use crate::model::{ConfigId, Diagnostic, WorkloadStatus};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ManagementError {
    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Runtime is shutting down")]
    Unavailable,

    #[error("Coordinator communication error: {0}")]
    Communication(CoordinatorError),
}

impl From<CoordinatorError> for ManagementError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::UnknownApplication(name) => ManagementError::NotFound(name),
            CoordinatorError::ShuttingDown => ManagementError::Unavailable,
            other => ManagementError::Communication(other),
        }
    }
}

/// Client for management and introspection tooling.
#[derive(Clone, Debug)]
pub struct ManagementClient {
    inner: CoordinatorClient,
}

impl ManagementClient {
    pub fn new(inner: CoordinatorClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CoordinatorAccess for ManagementClient {
    type Error = ManagementError;

    fn inner(&self) -> &CoordinatorClient {
        &self.inner
    }
}

impl ManagementClient {
    #[instrument(skip(self))]
    pub async fn start(&self, name: &str) -> Result<(), ManagementError> {
        debug!("Sending request");
        self.inner.start(name).await.map_err(Self::map_error)
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, name: &str) -> Result<(), ManagementError> {
        debug!("Sending request");
        self.inner.stop(name).await.map_err(Self::map_error)
    }

    #[instrument(skip(self))]
    pub async fn restart(&self, name: &str) -> Result<(), ManagementError> {
        debug!("Sending request");
        self.inner.restart(name).await.map_err(Self::map_error)
    }

    /// Forces a stop/start of the named workloads, or all of them with `None`.
    #[instrument(skip(self))]
    pub async fn recycle(&self, names: Option<Vec<String>>) -> Result<(), ManagementError> {
        debug!("Sending request");
        self.inner
            .recycle_applications(names)
            .await
            .map_err(Self::map_error)
    }

    /// Textual dump: one line per workload with type, phase and status.
    #[instrument(skip(self))]
    pub async fn describe(&self) -> Result<String, ManagementError> {
        self.inner.describe().await.map_err(Self::map_error)
    }

    #[instrument(skip(self))]
    pub async fn workloads(&self) -> Result<Vec<WorkloadSummary>, ManagementError> {
        self.inner.workloads().await.map_err(Self::map_error)
    }

    #[instrument(skip(self))]
    pub async fn status(&self, config_id: ConfigId) -> Result<Option<WorkloadStatus>, ManagementError> {
        self.inner.status(config_id).await.map_err(Self::map_error)
    }

    #[instrument(skip(self))]
    pub async fn diagnostics(&self) -> Result<Vec<Diagnostic>, ManagementError> {
        self.inner.diagnostics().await.map_err(Self::map_error)
    }

    /// Phase transitions and episode milestones published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_errors_map_to_management_errors() {
        assert_eq!(
            ManagementError::from(CoordinatorError::UnknownApplication("orders".into())),
            ManagementError::NotFound("orders".into())
        );
        assert_eq!(
            ManagementError::from(CoordinatorError::ShuttingDown),
            ManagementError::Unavailable
        );
        assert_eq!(
            ManagementError::from(CoordinatorError::ActorClosed),
            ManagementError::Communication(CoordinatorError::ActorClosed)
        );
    }
}
