//! # Mock State Machines
//!
//! Test doubles for the per-workload [`StateMachine`] contract, used to drive
//! the real coordinator actor in tests.
//!
//! Two modes:
//! - [`MockMode::Auto`]: behaves like a well-mannered workload. It stops at
//!   once, waits for its gating and start-after signals, then reports
//!   `Starting` and `Started`; uninstall completes immediately.
//! - [`MockMode::Manual`]: records everything and resolves nothing. The test
//!   completes each step through the [`MockMachine`] handle.
//!
//! Every call lands in a shared log that tests can inspect with
//! [`MockStateMachineFactory::calls`].
//!
//! ```ignore
//! let factory = MockStateMachineFactory::auto();
//! let system = CoordinatorSystem::new(config, factory.clone());
//! // ... drive the system ...
//! assert_eq!(factory.active_count("orders"), 1);
//! ```
//!
//! Locks are never held while a signal is resolved or a phase is reported.

use crate::model::{ConfigId, ConfigRecord, Phase};
use crate::workload::{
    AppHandler, ConfigureSignals, PhaseReporter, RecycleSignals, StateMachine, StateMachineFactory,
};
use parking_lot::Mutex;
use signal_framework::{joined, Signal, SignalError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    Auto,
    Manual,
}

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Created { name: String, config_id: ConfigId },
    Configure { name: String, start_after: usize },
    Recycle { name: String, with_started: bool },
    Uninstall { name: String },
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    SetAppHandler { name: String, handler: Option<String> },
}

impl MockCall {
    pub fn name(&self) -> &str {
        match self {
            MockCall::Created { name, .. }
            | MockCall::Configure { name, .. }
            | MockCall::Recycle { name, .. }
            | MockCall::Uninstall { name }
            | MockCall::Start { name }
            | MockCall::Stop { name }
            | MockCall::Restart { name }
            | MockCall::SetAppHandler { name, .. } => name,
        }
    }
}

struct MachineState {
    phase: Phase,
    configured: Option<ConfigureSignals>,
    recycled: Option<RecycleSignals>,
    removed: Option<Signal>,
    handler: Option<AppHandler>,
    blocked: bool,
    fail_start: Option<String>,
    uninstalled: bool,
    /// Leaves uninstall pending even in auto mode.
    hold_uninstall: bool,
    /// Whether `Installed` has been reported.
    announced: bool,
}

/// Handle on one mock state machine, shared with the factory.
#[derive(Clone)]
pub struct MockMachine {
    name: String,
    config_id: ConfigId,
    mode: MockMode,
    reporter: PhaseReporter,
    state: Arc<Mutex<MachineState>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockMachine {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_id(&self) -> &ConfigId {
        &self.config_id
    }

    pub fn reporter(&self) -> &PhaseReporter {
        &self.reporter
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn handler(&self) -> Option<AppHandler> {
        self.state.lock().handler.clone()
    }

    pub fn is_uninstalled(&self) -> bool {
        self.state.lock().uninstalled
    }

    /// Signals from the latest `configure` call.
    pub fn configured(&self) -> Option<ConfigureSignals> {
        self.state.lock().configured.clone()
    }

    /// Signals from the latest `recycle` call.
    pub fn recycled(&self) -> Option<RecycleSignals> {
        self.state.lock().recycled.clone()
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.state.lock().blocked = blocked;
    }

    /// Makes every later start attempt fail with `reason`.
    pub fn fail_starts(&self, reason: impl Into<String>) {
        self.state.lock().fail_start = Some(reason.into());
    }

    /// Reports a phase and remembers it.
    pub fn report(&self, phase: Phase) {
        self.state.lock().phase = phase;
        self.reporter.phase_changed(phase);
    }

    /// The next uninstall stops the machine but waits for
    /// [`complete_uninstall`](Self::complete_uninstall).
    pub fn hold_uninstall(&self) {
        self.state.lock().hold_uninstall = true;
    }

    /// Resolves the pending removal signal, if any.
    pub fn complete_uninstall(&self) -> bool {
        let removed = {
            let mut state = self.state.lock();
            state.uninstalled = true;
            state.removed.take()
        };
        removed.map(|r| r.succeed()).unwrap_or(false)
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }

    fn stop_now(&self) {
        if matches!(self.phase(), Phase::Started | Phase::Starting) {
            self.report(Phase::Stopping);
            self.report(Phase::Stopped);
        }
    }

    /// Once every gate resolves: starting, install called, started.
    fn start_when_ready(
        &self,
        gates: Vec<Signal>,
        starting: Option<Signal>,
        install_called: Signal,
        started: Option<Signal>,
    ) {
        let gate = joined(format!("resolves when {} may start", self.name), gates);
        let machine = self.clone();
        gate.on_completion(move |outcome| {
            if let Err(e) = outcome {
                match &starting {
                    Some(starting) => starting.fail(e.clone()),
                    None => install_called.fail(e.clone()),
                };
                return;
            }
            if let Some(starting) = &starting {
                starting.succeed();
            }
            machine.report(Phase::Starting);
            install_called.succeed();

            let failure = machine.state.lock().fail_start.clone();
            match failure {
                Some(reason) => {
                    if let Some(started) = &started {
                        started.fail(SignalError::failed(reason.clone()));
                    }
                    machine.reporter.start_failed(reason);
                    machine.report(Phase::Stopped);
                }
                None => {
                    machine.report(Phase::Started);
                    if let Some(started) = &started {
                        started.succeed();
                    }
                }
            }
        });
    }
}

impl StateMachine for MockMachine {
    fn configure(&self, config: &ConfigRecord, signals: ConfigureSignals) {
        self.record(MockCall::Configure {
            name: config.name.clone(),
            start_after: signals.start_after.len(),
        });
        self.state.lock().configured = Some(signals.clone());
        if self.mode == MockMode::Manual {
            return;
        }
        self.stop_now();
        let first = !std::mem::replace(&mut self.state.lock().announced, true);
        if first {
            self.report(Phase::Installed);
        }
        signals.stopped.succeed();
        let mut gates = signals.gating;
        gates.extend(signals.start_after);
        self.start_when_ready(
            gates,
            Some(signals.starting),
            signals.install_called,
            Some(signals.started),
        );
    }

    fn recycle(&self, signals: RecycleSignals) {
        self.record(MockCall::Recycle {
            name: self.name.clone(),
            with_started: signals.started.is_some(),
        });
        self.state.lock().recycled = Some(signals.clone());
        if self.mode == MockMode::Manual {
            return;
        }
        self.stop_now();
        signals.stopped.succeed();
        self.start_when_ready(signals.gating, None, signals.install_called, signals.started);
    }

    fn uninstall(&self, removed: Signal) {
        self.record(MockCall::Uninstall {
            name: self.name.clone(),
        });
        let hold = {
            let mut state = self.state.lock();
            state.removed = Some(removed);
            state.hold_uninstall
        };
        if self.mode == MockMode::Manual {
            return;
        }
        self.stop_now();
        if !hold {
            self.complete_uninstall();
        }
    }

    fn start(&self) {
        self.record(MockCall::Start {
            name: self.name.clone(),
        });
        if self.mode == MockMode::Auto && self.phase() != Phase::Started {
            self.report(Phase::Starting);
            self.report(Phase::Started);
        }
    }

    fn stop(&self) {
        self.record(MockCall::Stop {
            name: self.name.clone(),
        });
        if self.mode == MockMode::Auto {
            self.stop_now();
        }
    }

    fn restart(&self) {
        self.record(MockCall::Restart {
            name: self.name.clone(),
        });
        if self.mode == MockMode::Auto {
            self.stop_now();
            self.report(Phase::Starting);
            self.report(Phase::Started);
        }
    }

    fn set_app_handler(&self, handler: Option<AppHandler>) {
        self.record(MockCall::SetAppHandler {
            name: self.name.clone(),
            handler: handler.as_ref().map(|h| h.name.clone()),
        });
        self.state.lock().handler = handler;
    }

    fn is_blocked(&self) -> bool {
        self.state.lock().blocked
    }
}

/// Creates [`MockMachine`]s and keeps a handle on each of them.
#[derive(Clone)]
pub struct MockStateMachineFactory {
    mode: MockMode,
    calls: Arc<Mutex<Vec<MockCall>>>,
    machines: Arc<Mutex<Vec<MockMachine>>>,
    failing: Arc<Mutex<HashMap<String, String>>>,
}

impl MockStateMachineFactory {
    pub fn new(mode: MockMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: Arc::default(),
            machines: Arc::default(),
            failing: Arc::default(),
        })
    }

    pub fn auto() -> Arc<Self> {
        Self::new(MockMode::Auto)
    }

    pub fn manual() -> Arc<Self> {
        Self::new(MockMode::Manual)
    }

    /// Machines created later for `name` fail every start with `reason`.
    pub fn fail_starts_of(&self, name: impl Into<String>, reason: impl Into<String>) {
        self.failing.lock().insert(name.into(), reason.into());
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, name: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.name() == name)
            .cloned()
            .collect()
    }

    pub fn created(&self) -> usize {
        self.machines.lock().len()
    }

    /// Every machine ever created for `name`, oldest first.
    pub fn machines(&self, name: &str) -> Vec<MockMachine> {
        self.machines
            .lock()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    pub fn latest(&self, name: &str) -> Option<MockMachine> {
        self.machines(name).pop()
    }

    /// Machines for `name` that have not finished uninstalling.
    pub fn active_count(&self, name: &str) -> usize {
        self.machines(name)
            .iter()
            .filter(|m| !m.is_uninstalled())
            .count()
    }

    /// Panics unless no name has more than one live machine.
    pub fn verify(&self) {
        let machines = self.machines.lock().clone();
        let mut live: HashMap<&str, usize> = HashMap::new();
        for machine in machines.iter().filter(|m| !m.is_uninstalled()) {
            *live.entry(machine.name.as_str()).or_default() += 1;
        }
        if let Some((name, count)) = live.iter().find(|(_, count)| **count > 1) {
            panic!("{count} live state machines for {name}");
        }
    }
}

impl StateMachineFactory for MockStateMachineFactory {
    fn create(&self, config: &ConfigRecord, reporter: PhaseReporter) -> Box<dyn StateMachine> {
        let fail_start = self.failing.lock().get(&config.name).cloned();
        let machine = MockMachine {
            name: config.name.clone(),
            config_id: config.config_id.clone(),
            mode: self.mode,
            reporter,
            state: Arc::new(Mutex::new(MachineState {
                phase: Phase::Installed,
                configured: None,
                recycled: None,
                removed: None,
                handler: None,
                blocked: false,
                fail_start,
                uninstalled: false,
                hold_uninstall: false,
                announced: false,
            })),
            calls: self.calls.clone(),
        };
        self.calls.lock().push(MockCall::Created {
            name: config.name.clone(),
            config_id: config.config_id.clone(),
        });
        self.machines.lock().push(machine.clone());
        Box::new(machine)
    }
}
