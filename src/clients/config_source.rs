use crate::clients::access::CoordinatorAccess;
use crate::coordinator::{CoordinatorClient, CoordinatorError, RuntimeNotification};
use crate::model::{ConfigId, ConfigProperties};
use async_trait::async_trait;
use signal_framework::Signal;
use tracing::{debug, info, instrument};

/// Client used by the configuration source.
///
/// Both calls are idempotent. Malformed records are accepted; the problem
/// shows up in the coordinator's diagnostics instead of as an error here.
#[derive(Clone, Debug)]
pub struct ConfigSourceClient {
    inner: CoordinatorClient,
}

impl ConfigSourceClient {
    pub fn new(inner: CoordinatorClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CoordinatorAccess for ConfigSourceClient {
    type Error = CoordinatorError;

    fn inner(&self) -> &CoordinatorClient {
        &self.inner
    }
}

impl ConfigSourceClient {
    #[instrument(skip(self, properties))]
    pub async fn updated(
        &self,
        config_id: ConfigId,
        properties: ConfigProperties,
    ) -> Result<(), CoordinatorError> {
        debug!(?properties, "Sending request");
        self.inner.config_updated(config_id, properties).await
    }

    #[instrument(skip(self))]
    pub async fn deleted(&self, config_id: ConfigId) -> Result<(), CoordinatorError> {
        debug!("Sending request");
        self.inner.config_deleted(config_id).await
    }

    /// Delivers a batch of records inside one episode, then reports the batch
    /// as delivered.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn deliver(
        &self,
        records: Vec<(ConfigId, ConfigProperties)>,
    ) -> Result<(), CoordinatorError> {
        let guard = self.inner.join_episode().await?;
        let delivered = Signal::new("resolves when configuration updates are delivered");
        self.inner
            .runtime_notification(RuntimeNotification::ConfigUpdatesDelivered, delivered.clone())
            .await?;
        for (config_id, properties) in records {
            self.inner.config_updated(config_id, properties).await?;
        }
        info!("Configuration batch delivered");
        delivered.succeed();
        drop(guard);
        Ok(())
    }
}
