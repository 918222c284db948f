//! # Tracing Setup
//!
//! Structured logging for binaries built on the signal framework.
//!
//! Verbosity comes from `RUST_LOG`:
//!
//! ```bash
//! RUST_LOG=info cargo run                         # lifecycle milestones
//! RUST_LOG=debug cargo run                        # plus application dumps
//! RUST_LOG=signal_framework=trace cargo run       # every signal resolution
//! ```

/// Installs a compact `tracing` subscriber filtered by `RUST_LOG`.
///
/// Calling it twice is harmless: the second installation attempt is ignored.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
