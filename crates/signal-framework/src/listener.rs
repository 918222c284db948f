//! # Cancelable Listeners
//!
//! A listener registered through [`Signal::on_completion_cancelable`] can be
//! detached later. The signal still holds the closure, but once the returned
//! [`ListenerHandle`] is cancelled the closure does nothing when it fires.

use crate::error::Outcome;
use crate::signal::Signal;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Detaches a listener registered with [`Signal::on_completion_cancelable`].
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    token: CancellationToken,
}

impl ListenerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Signal {
    /// Registers a listener that can be detached with the returned handle.
    pub fn on_completion_cancelable(
        &self,
        listener: impl FnOnce(&Outcome) + Send + 'static,
    ) -> ListenerHandle {
        let token = CancellationToken::new();
        let guard = token.clone();
        let description = self.to_string();
        self.on_completion(move |outcome| {
            if guard.is_cancelled() {
                trace!(signal = %description, "Cancelled listener skipped");
                return;
            }
            listener(outcome);
        });
        ListenerHandle { token }
    }
}
