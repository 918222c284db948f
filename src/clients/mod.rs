//! Collaborator-facing wrappers around [`CoordinatorClient`](crate::coordinator::CoordinatorClient).

pub mod access;
pub mod config_source;
pub mod management;
pub mod runtime;

pub use access::*;
pub use config_source::*;
pub use management::*;
pub use runtime::*;
