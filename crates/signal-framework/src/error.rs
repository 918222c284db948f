//! # Signal Errors
//!
//! The failure half of a [`Signal`](crate::Signal) outcome. Every listener of a
//! signal observes the same value, so the error is cheap to clone and compares
//! by value.

use std::sync::Arc;

/// The failure a [`Signal`](crate::Signal) can be resolved with.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SignalError {
    /// The producer reported a failure with a human readable reason.
    #[error("failed: {0}")]
    Failed(Arc<str>),
    /// The signal was dropped by every holder before anyone resolved it.
    #[error("abandoned before resolution")]
    Abandoned,
}

impl SignalError {
    pub fn failed(reason: impl Into<String>) -> Self {
        SignalError::Failed(Arc::from(reason.into()))
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SignalError::Failed(_) => "signal_failed",
            SignalError::Abandoned => "signal_abandoned",
        }
    }
}

/// What every listener of a signal observes.
///
/// `Ok(bool)` mirrors a boolean completion (joins AND the values together);
/// `Err` is a failure that short-circuits joins.
pub type Outcome = Result<bool, SignalError>;
