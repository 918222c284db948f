//! System wiring: settings, the running coordinator and tracing setup.

pub mod config;
pub mod coordinator_system;
pub mod tracing;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator_system::CoordinatorSystem;
pub use tracing::setup_tracing;
