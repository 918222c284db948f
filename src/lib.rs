//! # Application Lifecycle Coordinator
//!
//! > **Ordered install, start, stop and restart for a dynamic set of named workloads.**
//!
//! Workloads ("applications") arrive as configuration records, change, get
//! renamed and disappear while the surrounding runtime is itself updating.
//! This crate decides *when* each workload's state machine may act and
//! *what* it has to wait for. It never installs or starts anything itself.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Why an Actor?
//!
//! The identity maps (by name and by config id), the blocked-config queues and
//! the current episode must change together. A single Tokio task owns all of
//! them and processes commands one at a time:
//! - **Atomicity**: cross-map invariants hold between any two commands.
//! - **No lock re-entry**: signal listeners send commands back to the actor
//!   instead of touching its state.
//! - **Testability**: the real actor runs against mock state machines.
//!
//! ### Why Signals?
//!
//! Every readiness condition is a one-shot [`Signal`](signal_framework::Signal)
//! from the `signal-framework` crate: runtime readiness, "dependency started",
//! "everything stopped". Joining signals is how workloads and episodes wait.
//!
//! ## 👩‍💻 Architecture Notes
//!
//! ### 1. Episodes
//! Every event that affects workload lifecycles takes a reference on the
//! current episode. When the last reference is released, the episode stops
//! everything that changed, then lets it all start again in one transition.
//! Guards ([`EpisodeRef`](coordinator::EpisodeRef)) make a missed release
//! impossible.
//!
//! ### 2. Identity Conflicts
//! Renames, duplicate names and re-appearing configs are resolved by
//! uninstalling and queueing. A record that loses a name is replayed once the
//! owner is gone.
//!
//! ### 3. Start-After Ordering
//! Workloads may declare other workloads they start after. Cycles are reported
//! once per name and leave the workloads stuck, never crashed.
//!
//! ### 4. Observability
//! Structured `tracing` logs throughout; see [`lifecycle::tracing`]. A broadcast
//! stream of [`CoordinatorEvent`](coordinator::CoordinatorEvent)s feeds
//! management tooling.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Data ([`model`])
//! Configuration records, phases, statuses, diagnostics and recycle contexts.
//!
//! ### 2. The Contract ([`workload`])
//! The [`StateMachine`](workload::StateMachine) each workload is driven by.
//!
//! ### 3. The Engine ([`coordinator`])
//! The [`CoordinatorActor`](coordinator::CoordinatorActor) and the components it
//! owns.
//!
//! ### 4. The Interface ([`clients`])
//! One client per collaborator: configuration source, runtime, management.
//!
//! ### 5. The Orchestrator ([`lifecycle`])
//! [`CoordinatorSystem`](lifecycle::CoordinatorSystem) spawns the actor and
//! wires the clients; [`CoordinatorConfig`](lifecycle::CoordinatorConfig)
//! holds the settings.
//!
//! ### 6. Test Doubles ([`mock`])
//! Auto-completing and manual mock state machines.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! RUST_LOG=info cargo run
//! cargo test
//! ```

pub mod clients;
pub mod coordinator;
pub mod lifecycle;
pub mod mock;
pub mod model;
pub mod workload;
