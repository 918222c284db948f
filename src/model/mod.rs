//! Plain data shared between the coordinator and its collaborators.

pub mod config;
pub mod diagnostics;
pub mod phase;
pub mod recycle;

pub use config::*;
pub use diagnostics::*;
pub use phase::*;
pub use recycle::*;
