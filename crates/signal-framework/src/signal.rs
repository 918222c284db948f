//! # One-shot Signals
//!
//! A [`Signal`] is a single-assignment asynchronous result. It plays the role a
//! `oneshot` channel plays between a client and an actor, except that any number
//! of parties may listen and any party holding a clone may resolve it.
//!
//! ## Rules
//! - **First writer wins**: only the first call to [`Signal::resolve`] has an
//!   effect. Later calls return `false` and change nothing.
//! - **At-most-once delivery**: every listener runs exactly once, on the thread
//!   that resolved the signal, in registration order.
//! - **Late listeners**: registering on an already resolved signal runs the
//!   listener immediately on the caller's thread.
//! - **Abandonment**: if every clone is dropped while still pending, listeners
//!   observe [`SignalError::Abandoned`].
//!
//! Listeners run without any internal lock held, so a listener may freely
//! resolve other signals or register further listeners.

use crate::error::{Outcome, SignalError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

type Listener = Box<dyn FnOnce(&Outcome) + Send + 'static>;

enum State {
    Pending(Vec<Listener>),
    Resolved(Outcome),
}

struct Inner {
    sequence: u64,
    description: String,
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = std::mem::replace(
            self.state.get_mut(),
            State::Resolved(Err(SignalError::Abandoned)),
        );
        if let State::Pending(listeners) = state {
            if listeners.is_empty() {
                return;
            }
            debug!(
                sequence = self.sequence,
                description = %self.description,
                listeners = listeners.len(),
                "Signal abandoned"
            );
            let outcome = Err(SignalError::Abandoned);
            for listener in listeners {
                listener(&outcome);
            }
        }
    }
}

/// A one-shot, multi-listener completion with a description for diagnostics.
///
/// Cloning is cheap and every clone refers to the same underlying result.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<Inner>,
}

impl Signal {
    /// Creates a pending signal.
    pub fn new(description: impl Into<String>) -> Self {
        let signal = Self {
            inner: Arc::new(Inner {
                sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
                description: description.into(),
                state: Mutex::new(State::Pending(Vec::new())),
            }),
        };
        trace!(signal = %signal, "Created");
        signal
    }

    /// Creates a signal that is already resolved with `outcome`.
    pub fn resolved(description: impl Into<String>, outcome: Outcome) -> Self {
        let signal = Self::new(description);
        signal.resolve(outcome);
        signal
    }

    /// Monotonically increasing creation number, unique per process.
    pub fn sequence(&self) -> u64 {
        self.inner.sequence
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Resolves the signal. Returns `true` if this call decided the outcome.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        let listeners = {
            let mut state = self.inner.state.lock();
            let listeners = match &mut *state {
                State::Resolved(existing) => {
                    trace!(signal = %self, ?existing, ignored = ?outcome, "Already resolved");
                    return false;
                }
                State::Pending(listeners) => std::mem::take(listeners),
            };
            *state = State::Resolved(outcome.clone());
            listeners
        };
        trace!(signal = %self, ?outcome, listeners = listeners.len(), "Resolved");
        for listener in listeners {
            listener(&outcome);
        }
        true
    }

    /// Shorthand for `resolve(Ok(true))`.
    pub fn succeed(&self) -> bool {
        self.resolve(Ok(true))
    }

    /// Shorthand for `resolve(Err(error))`.
    pub fn fail(&self, error: SignalError) -> bool {
        self.resolve(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Resolved(_))
    }

    /// The outcome, if resolved.
    pub fn outcome(&self) -> Option<Outcome> {
        match &*self.inner.state.lock() {
            State::Resolved(outcome) => Some(outcome.clone()),
            State::Pending(_) => None,
        }
    }

    /// Registers a listener that runs exactly once with the outcome.
    pub fn on_completion(&self, listener: impl FnOnce(&Outcome) + Send + 'static) {
        let outcome = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending(listeners) => {
                    listeners.push(Box::new(listener));
                    return;
                }
                State::Resolved(outcome) => outcome.clone(),
            }
        };
        listener(&outcome);
    }

    /// Waits asynchronously for the outcome.
    pub async fn wait(&self) -> Outcome {
        let (respond_to, response) = oneshot::channel();
        self.on_completion(move |outcome| {
            let _ = respond_to.send(outcome.clone());
        });
        response.await.unwrap_or(Err(SignalError::Abandoned))
    }

    /// Whether both handles refer to the same signal.
    pub fn same_as(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal#{}[{}]", self.inner.sequence, self.inner.description)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("sequence", &self.inner.sequence)
            .field("description", &self.inner.description)
            .field("outcome", &self.outcome())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn first_resolution_wins() {
        let signal = Signal::new("resolves when the test says so");
        assert!(signal.resolve(Err(SignalError::failed("transient"))));
        assert!(!signal.succeed());
        assert_eq!(signal.outcome(), Some(Err(SignalError::failed("transient"))));
    }

    #[test]
    fn listeners_run_once_in_registration_order() {
        let signal = Signal::new("ordered");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            signal.on_completion(move |outcome| seen.lock().push((i, outcome.clone())));
        }
        signal.succeed();
        signal.resolve(Ok(false));
        assert_eq!(
            *seen.lock(),
            vec![(0, Ok(true)), (1, Ok(true)), (2, Ok(true))]
        );
    }

    #[test]
    fn late_listener_runs_synchronously() {
        let signal = Signal::resolved("already done", Ok(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        signal.on_completion(move |outcome| {
            assert_eq!(outcome, &Ok(false));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_resolve_other_signals() {
        let first = Signal::new("first");
        let second = Signal::new("second");
        let chained = second.clone();
        first.on_completion(move |outcome| {
            chained.resolve(outcome.clone());
        });
        first.succeed();
        assert_eq!(second.outcome(), Some(Ok(true)));
    }

    #[test]
    fn dropping_pending_signal_notifies_abandonment() {
        let observed = Arc::new(Mutex::new(None));
        {
            let signal = Signal::new("dropped");
            let observed = observed.clone();
            signal.on_completion(move |outcome| *observed.lock() = Some(outcome.clone()));
        }
        assert_eq!(*observed.lock(), Some(Err(SignalError::Abandoned)));
    }

    #[test]
    fn sequence_numbers_increase() {
        let a = Signal::new("a");
        let b = Signal::new("b");
        assert!(b.sequence() > a.sequence());
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[tokio::test]
    async fn wait_observes_resolution_from_another_task() {
        let signal = Signal::new("remote");
        let remote = signal.clone();
        tokio::spawn(async move {
            remote.succeed();
        });
        assert_eq!(signal.wait().await, Ok(true));
    }
}
