//! Error types for the coordinator.

use thiserror::Error;

/// Errors returned to callers of the coordinator.
///
/// Configuration problems are not errors: they become
/// [`Diagnostic`](crate::model::Diagnostic)s and the call still succeeds.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoordinatorError {
    /// The coordinator task has stopped and no longer accepts commands.
    #[error("Coordinator closed")]
    ActorClosed,

    /// The coordinator dropped the response channel without answering.
    #[error("Coordinator dropped response channel")]
    ActorDropped,

    /// No workload is registered under this name.
    #[error("Unknown application: {0}")]
    UnknownApplication(String),

    /// A handler was removed for a type that was never seen.
    #[error("Unknown application type: {0}")]
    UnknownType(String),

    /// The runtime is shutting down; the request was ignored.
    #[error("Coordinator is shutting down")]
    ShuttingDown,

    /// Internal maps disagree. The coordinator stops after reporting this.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The coordinator task ended abnormally.
    #[error("Coordinator task failed: {0}")]
    TaskFailed(String),
}
