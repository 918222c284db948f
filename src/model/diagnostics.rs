//! Audit records for non-fatal problems.
//!
//! Configuration and cycle problems never fail the coordinator. They are
//! recorded here, logged once, and left for an operator to fix.

use crate::model::config::ConfigId;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A record is missing `location`, `type` or `name` after inference.
    InvalidConfig {
        config_id: ConfigId,
        missing: Vec<String>,
    },
    /// A record lost a naming conflict and is queued behind the owner.
    DuplicateName {
        name: String,
        config_id: ConfigId,
        owner: ConfigId,
    },
    /// A workload takes part in a start-after cycle.
    StartAfterCycle { name: String, cycle: Vec<String> },
}

impl Diagnostic {
    /// The workload name or config id the record is filed against.
    pub fn subject(&self) -> &str {
        match self {
            Diagnostic::InvalidConfig { config_id, .. } => config_id.as_str(),
            Diagnostic::DuplicateName { name, .. } => name,
            Diagnostic::StartAfterCycle { name, .. } => name,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InvalidConfig { config_id, missing } => write!(
                f,
                "application configuration {config_id} is missing {}",
                missing.join(", ")
            ),
            Diagnostic::DuplicateName {
                name,
                config_id,
                owner,
            } => write!(
                f,
                "application name {name} from configuration {config_id} is already used by configuration {owner}"
            ),
            Diagnostic::StartAfterCycle { name, cycle } => write!(
                f,
                "application {name} is part of a start-after cycle: {}",
                cycle.join(" -> ")
            ),
        }
    }
}
