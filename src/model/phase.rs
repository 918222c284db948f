//! Externally visible lifecycle vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase reported by a workload's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Installed,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Installed => "installed",
            Phase::Starting => "starting",
            Phase::Started => "started",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Status of a configuration record as reported to management tooling.
///
/// Keyed by config id rather than name, so a config that never became a
/// workload (blocked or invalid) still has a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadStatus {
    Pending,
    Started,
    Failed,
    DuplicateName,
    Cyclic,
    Removed,
    Unconfigured,
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadStatus::Pending => "pending",
            WorkloadStatus::Started => "started",
            WorkloadStatus::Failed => "failed",
            WorkloadStatus::DuplicateName => "duplicate_name",
            WorkloadStatus::Cyclic => "cyclic",
            WorkloadStatus::Removed => "removed",
            WorkloadStatus::Unconfigured => "unconfigured",
        };
        f.write_str(s)
    }
}
