//! # Lifecycle Coordinator
//!
//! Maps configuration records to workload identities, orders their startup
//! through start-after dependencies and batches every change that arrives
//! while the runtime is updating into a single stop-all then start-all
//! episode.
//!
//! ## Components
//!
//! | Module | Owns |
//! |--------|------|
//! | [`identity`] | name and config-id maps, blocked configs per contested name |
//! | [`graph`] | start-after waiters and cycle reporting |
//! | [`episode`] | the reference-counted batch and its phase signals |
//! | [`type_support`] | per-type readiness and waiting identities |
//! | [`recycle`] | shared resources whose loss forces restarts |
//! | [`cache`] | on-disk cache cleanup keyed by config id |
//! | [`actor`] | the single task that owns all of the above |
//!
//! Only [`CoordinatorClient`] and [`CoordinatorActor`] are meant to be used
//! directly; the component modules are public for tests and tooling.

pub mod actor;
pub mod cache;
pub mod client;
pub mod episode;
pub mod error;
pub mod events;
pub mod graph;
pub mod identity;
pub mod message;
pub mod recycle;
pub mod type_support;

pub use actor::CoordinatorActor;
pub use client::CoordinatorClient;
pub use episode::{EpisodeId, EpisodeRef, EpisodeSignals};
pub use error::CoordinatorError;
pub use events::{CoordinatorEvent, EventKind};
pub use identity::IdentityId;
pub use message::{RuntimeNotification, WorkloadSummary};
