use crate::clients::{ConfigSourceClient, ManagementClient, RuntimeClient};
use crate::coordinator::{CoordinatorActor, CoordinatorClient, CoordinatorError};
use crate::lifecycle::CoordinatorConfig;
use crate::workload::StateMachineFactory;
use signal_framework::joined;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The running coordinator and the clients wired to it.
///
/// `CoordinatorSystem` is responsible for:
/// - **Lifecycle Management**: spawning the coordinator actor and stopping it
/// - **Dependency Wiring**: handing each collaborator its own client
///
/// # Example
///
/// ```ignore
/// let system = CoordinatorSystem::new(CoordinatorConfig::default(), factory);
///
/// system.config_source.updated("42".into(), props).await?;
/// system.runtime.ready_to_start().await?;
///
/// system.shutdown().await?;
/// ```
pub struct CoordinatorSystem {
    /// Client for the configuration source
    pub config_source: ConfigSourceClient,

    /// Client for the surrounding runtime
    pub runtime: RuntimeClient,

    /// Client for management tooling
    pub management: ManagementClient,

    client: CoordinatorClient,
    grace: Duration,
    handle: JoinHandle<()>,
}

impl CoordinatorSystem {
    /// Spawns the coordinator actor. Must be called inside a Tokio runtime.
    pub fn new(config: CoordinatorConfig, factory: Arc<dyn StateMachineFactory>) -> Self {
        let (actor, client) = CoordinatorActor::new(&config, factory);
        let handle = tokio::spawn(actor.run());
        info!(grace_ms = config.shutdown_grace_ms, "Coordinator system started");

        Self {
            config_source: ConfigSourceClient::new(client.clone()),
            runtime: RuntimeClient::new(client.clone()),
            management: ManagementClient::new(client.clone()),
            client,
            grace: config.shutdown_grace(),
            handle,
        }
    }

    pub fn client(&self) -> &CoordinatorClient {
        &self.client
    }

    /// Uninstalls every workload, waits up to the grace period for the
    /// uninstalls to finish, then stops the actor.
    pub async fn shutdown(self) -> Result<(), CoordinatorError> {
        info!("Shutting down coordinator...");

        match self.runtime.shutting_down().await {
            Ok(removals) => {
                let pending = removals.len();
                let all_removed = joined("resolves when every application is removed", removals);
                if tokio::time::timeout(self.grace, all_removed.wait())
                    .await
                    .is_err()
                {
                    warn!(pending, grace = ?self.grace, "Applications still uninstalling after grace period");
                }
            }
            Err(e) => warn!(error = %e, "Coordinator unavailable during shutdown"),
        }

        // The actor may already be gone after an invariant violation.
        let _ = self.client.close();
        drop(self.config_source);
        drop(self.runtime);
        drop(self.management);
        drop(self.client);

        if let Err(e) = self.handle.await {
            error!("Coordinator task failed: {:?}", e);
            return Err(CoordinatorError::TaskFailed(e.to_string()));
        }

        info!("Coordinator shutdown complete.");
        Ok(())
    }
}
