use crate::coordinator::identity::IdentityId;
use crate::coordinator::message::Command;
use crate::model::{ConfigId, Phase};
use tokio::sync::mpsc;
use tracing::debug;

/// Channel back into the coordinator for one workload's state machine.
///
/// Reports are fire-and-forget: they are queued on the coordinator's command
/// channel and applied in order. Reports sent after the workload was removed
/// are ignored by the coordinator.
#[derive(Clone, Debug)]
pub struct PhaseReporter {
    sender: mpsc::UnboundedSender<Command>,
    identity: IdentityId,
    name: String,
    config_id: ConfigId,
}

impl PhaseReporter {
    pub(crate) fn new(
        sender: mpsc::UnboundedSender<Command>,
        identity: IdentityId,
        name: String,
        config_id: ConfigId,
    ) -> Self {
        Self {
            sender,
            identity,
            name,
            config_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_id(&self) -> &ConfigId {
        &self.config_id
    }

    pub fn phase_changed(&self, phase: Phase) {
        let command = Command::PhaseChanged {
            identity: self.identity,
            phase,
        };
        if self.sender.send(command).is_err() {
            debug!(name = %self.name, %phase, "Coordinator gone, phase report dropped");
        }
    }

    pub fn start_failed(&self, reason: impl Into<String>) {
        let command = Command::StartFailed {
            identity: self.identity,
            reason: reason.into(),
        };
        if self.sender.send(command).is_err() {
            debug!(name = %self.name, "Coordinator gone, failure report dropped");
        }
    }
}
