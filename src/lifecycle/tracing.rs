//! # Observability & Tracing
//!
//! The coordinator logs through `tracing` with structured fields; the
//! subscriber is installed by [`setup_tracing`], shared with the signal
//! framework.
//!
//! ## What Gets Traced
//!
//! - **info**: workload creation and removal, renames, phase transitions,
//!   episode stop/start milestones, context releases
//! - **warn**: invalid configurations, duplicate names, failed starts
//! - **error**: start-after cycles, failed episode stops, invariant violations
//! - **debug**: the full applications dump after every mutating command
//! - **trace**: individual signal resolutions (`signal_framework=trace`)
//!
//! ## Usage Examples
//!
//! ```bash
//! RUST_LOG=info cargo run
//! RUST_LOG=app_coordinator=debug cargo run
//! RUST_LOG=debug,signal_framework=trace cargo run
//! ```
//!
//! With `RUST_LOG=info` a single episode reads like:
//!
//! ```text
//! INFO Created id=app#1 name="orders" config_id=42 app_type="war"
//! INFO Runtime ready to start applications
//! INFO Episode stopping episode=1
//! INFO All applications stopped, episode starting episode=1
//! INFO Phase changed name="orders" old=installed new=starting
//! INFO Phase changed name="orders" old=starting new=started
//! ```

pub use signal_framework::tracing::setup_tracing;
