use crate::coordinator::{CoordinatorClient, CoordinatorError};
use async_trait::async_trait;

/// Shared behaviour of the collaborator-facing clients.
///
/// Each collaborator (configuration source, runtime, management tooling) gets
/// its own wrapper with its own error type; this trait supplies the plumbing
/// they all need.
#[async_trait]
pub trait CoordinatorAccess: Send + Sync {
    /// The collaborator-specific error type.
    type Error: From<CoordinatorError> + Send + Sync;

    /// Access the underlying coordinator client.
    fn inner(&self) -> &CoordinatorClient;

    /// Map coordinator errors to the collaborator's error type.
    fn map_error(e: CoordinatorError) -> Self::Error {
        Self::Error::from(e)
    }

    /// Wait for the coordinator to process everything sent so far.
    #[tracing::instrument(skip(self))]
    async fn settle(&self) -> Result<(), Self::Error> {
        tracing::debug!("Sending request");
        self.inner().settle().await.map_err(Self::map_error)
    }
}
