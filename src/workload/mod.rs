//! # Workload State Machine Contract
//!
//! The coordinator never installs, starts or stops anything itself. Each
//! workload identity exclusively owns one [`StateMachine`] that does the real
//! work; the coordinator decides *when* it may act by handing it [`Signal`]s.
//!
//! ## Architecture Note
//! Every method here is non-blocking. The coordinator calls them from inside
//! its own message loop, so an implementation that needs to wait must do so
//! by registering on the signals it was given (or by spawning a task), never
//! by blocking the caller.
//!
//! Phase changes flow the other way through the [`PhaseReporter`] handed to
//! [`StateMachineFactory::create`].

pub mod reporter;

pub use reporter::PhaseReporter;

use crate::model::ConfigRecord;
use signal_framework::Signal;
use std::fmt;

/// The installed handler for one workload type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppHandler {
    pub app_type: String,
    pub name: String,
}

impl AppHandler {
    pub fn new(app_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_type: app_type.into(),
            name: name.into(),
        }
    }
}

/// Everything a state machine needs for one configured start cycle.
#[derive(Clone)]
pub struct ConfigureSignals {
    /// Runtime readiness plus type-level readiness.
    pub gating: Vec<Signal>,
    /// One signal per dependency that has not started yet.
    pub start_after: Vec<Signal>,
    /// Resolved by the state machine once the previous incarnation stopped.
    pub stopped: Signal,
    /// Resolved by the state machine when it begins starting.
    pub starting: Signal,
    /// Resolved by the state machine once install has been called.
    pub install_called: Signal,
    /// Resolved by the state machine once the workload has started.
    pub started: Signal,
}

/// Re-arms a state machine for a forced restart.
#[derive(Clone)]
pub struct RecycleSignals {
    /// Runtime readiness, type readiness and start-after signals together.
    pub gating: Vec<Signal>,
    pub stopped: Signal,
    pub install_called: Signal,
    /// Only supplied for resource-adapter workloads.
    pub started: Option<Signal>,
}

impl fmt::Debug for ConfigureSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigureSignals")
            .field("gating", &self.gating.len())
            .field("start_after", &self.start_after.len())
            .field("stopped", &self.stopped.to_string())
            .field("started", &self.started.to_string())
            .finish()
    }
}

impl fmt::Debug for RecycleSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecycleSignals")
            .field("gating", &self.gating.len())
            .field("stopped", &self.stopped.to_string())
            .field("started", &self.started.as_ref().map(ToString::to_string))
            .finish()
    }
}

/// The external per-workload state machine.
pub trait StateMachine: Send + Sync {
    /// Supplies all gating and reporting signals for one start cycle.
    fn configure(&self, config: &ConfigRecord, signals: ConfigureSignals);

    /// Re-arms the machine for a forced restart.
    fn recycle(&self, signals: RecycleSignals);

    /// Tears the workload down and resolves `removed` on completion.
    fn uninstall(&self, removed: Signal);

    fn start(&self);

    fn stop(&self);

    fn restart(&self);

    /// Binds or clears the type handler.
    fn set_app_handler(&self, handler: Option<AppHandler>);

    /// Whether the machine is stalled waiting for a handler.
    fn is_blocked(&self) -> bool;
}

/// Creates one state machine per workload identity.
pub trait StateMachineFactory: Send + Sync {
    fn create(&self, config: &ConfigRecord, reporter: PhaseReporter) -> Box<dyn StateMachine>;
}
