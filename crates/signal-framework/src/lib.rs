//! # Signal Framework
//!
//! Domain-independent completion primitives for coordinating asynchronous
//! lifecycle work across many independent parties.
//!
//! ## Why Signals?
//!
//! An actor answering a request uses a `oneshot` channel: one producer, one
//! consumer, one value. Lifecycle orchestration needs something wider:
//!
//! - A workload's "started" completion is observed by every dependent that
//!   declared it must start afterwards.
//! - A workload's "stopped" completion is folded into an episode-wide
//!   "everything stopped" completion.
//! - Completions are produced by code the coordinator does not own, on threads
//!   it does not choose.
//!
//! A [`Signal`] is that wider primitive: single assignment, many listeners,
//! resolvable from any clone, safe to share across threads.
//!
//! ## Core Abstractions
//!
//! 1. **[`Signal`]** - one-shot boolean-or-failure result with listeners.
//! 2. **[`join_all`]** - AND-success / fail-fast aggregation of many signals.
//! 3. **[`ListenerHandle`]** - detach a listener without touching the signal.
//!
//! ```rust
//! use signal_framework::{joined, Signal};
//!
//! let stopped_a = Signal::new("resolves when a has stopped");
//! let stopped_b = Signal::new("resolves when b has stopped");
//! let all_stopped = joined("resolves when every workload has stopped",
//!                          vec![stopped_a.clone(), stopped_b.clone()]);
//!
//! stopped_a.succeed();
//! assert!(!all_stopped.is_resolved());
//! stopped_b.succeed();
//! assert_eq!(all_stopped.outcome(), Some(Ok(true)));
//! ```
//!
//! ## Concurrency Model
//!
//! - Signal state sits behind a `parking_lot::Mutex` held only for the state
//!   swap; listeners always run with the lock released.
//! - Listeners run on whichever thread resolves the signal. A listener that
//!   needs to mutate shared state should send a message to the owning actor
//!   rather than lock anything itself.

pub mod error;
pub mod join;
pub mod listener;
pub mod signal;
pub mod tracing;

pub use error::{Outcome, SignalError};
pub use join::{join_all, joined};
pub use listener::ListenerHandle;
pub use signal::Signal;
