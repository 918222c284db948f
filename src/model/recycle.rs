//! Shared resources whose invalidation forces dependent workloads to restart.
//!
//! A [`RecycleContext`] stands for a shared resource owned by one workload
//! (typically a resource adapter). Each [`RecycleComponent`] is a live piece of
//! that resource which other workloads depend on by name.

use signal_framework::Signal;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A shared resource registered by the workload that owns it.
#[derive(Debug, Clone)]
pub struct RecycleContext {
    pub id: ContextId,
    /// Name of the workload providing the resource, if known.
    pub owner: Option<String>,
    /// Resolved by the coordinator once every workload using the resource has
    /// stopped in the episode that unset it.
    pub apps_stopped: Option<Signal>,
}

impl RecycleContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ContextId::new(id),
            owner: None,
            apps_stopped: None,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_apps_stopped(mut self, signal: Signal) -> Self {
        self.apps_stopped = Some(signal);
        self
    }
}

/// A live piece of a shared resource and the workloads that depend on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecycleComponent {
    pub id: ComponentId,
    pub context: Option<ContextId>,
    pub dependents: BTreeSet<String>,
}

impl RecycleComponent {
    pub fn new(id: impl Into<String>, context: Option<ContextId>) -> Self {
        Self {
            id: ComponentId::new(id),
            context,
            dependents: BTreeSet::new(),
        }
    }

    pub fn with_dependents<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependents.extend(names.into_iter().map(Into::into));
        self
    }
}
