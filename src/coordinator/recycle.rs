//! Registry of shared resources and their live components.
//!
//! A context can be unset before its components are gone. It stays in the
//! registry, pending, until the last component is removed too; only then is
//! it reported as drained.

use crate::model::{ComponentId, ContextId, RecycleComponent, RecycleContext};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct ContextState {
    /// `None` once the context itself has been unset.
    context: Option<RecycleContext>,
    components: BTreeMap<ComponentId, RecycleComponent>,
}

impl ContextState {
    fn is_drained(&self) -> bool {
        self.context.is_none() && self.components.is_empty()
    }
}

/// What unsetting a context found.
#[derive(Debug, PartialEq, Eq)]
pub enum ContextRemoval {
    /// The context was never set.
    Unknown,
    /// Components remain; the context is pending removal.
    Pending,
    /// Nothing remains; the context left the registry.
    Drained,
}

#[derive(Debug, Default)]
pub struct RecycleRegistry {
    contexts: BTreeMap<ContextId, ContextState>,
}

impl RecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_context(&mut self, context: RecycleContext) {
        let id = context.id.clone();
        self.contexts.entry(id).or_default().context = Some(context);
    }

    pub fn context(&self, id: &ContextId) -> Option<&RecycleContext> {
        self.contexts.get(id).and_then(|state| state.context.as_ref())
    }

    pub fn unset_context(&mut self, id: &ContextId) -> ContextRemoval {
        let Some(state) = self.contexts.get_mut(id) else {
            return ContextRemoval::Unknown;
        };
        if state.context.take().is_none() {
            return ContextRemoval::Unknown;
        }
        if state.is_drained() {
            self.contexts.remove(id);
            ContextRemoval::Drained
        } else {
            ContextRemoval::Pending
        }
    }

    /// Components without a context are tracked under an unnamed slot.
    pub fn set_component(&mut self, component: RecycleComponent) {
        let key = component
            .context
            .clone()
            .unwrap_or_else(|| ContextId::new(""));
        self.contexts
            .entry(key)
            .or_default()
            .components
            .insert(component.id.clone(), component);
    }

    /// Removes a component and returns the contexts that drained because of it.
    pub fn unset_component(&mut self, component: &RecycleComponent) -> Vec<ContextId> {
        let keys: Vec<ContextId> = match &component.context {
            Some(context) => vec![context.clone()],
            None => self.contexts.keys().cloned().collect(),
        };
        let mut drained = Vec::new();
        for key in keys {
            let Some(state) = self.contexts.get_mut(&key) else {
                continue;
            };
            let removed = state.components.remove(&component.id).is_some();
            if removed && state.is_drained() {
                self.contexts.remove(&key);
                // The unnamed slot holds no context reference.
                if !key.as_str().is_empty() {
                    drained.push(key);
                }
            }
        }
        drained
    }

    /// Names of every workload depending on a component of `context`.
    pub fn dependents_of(&self, context: &ContextId) -> BTreeSet<String> {
        self.contexts
            .get(context)
            .map(|state| {
                state
                    .components
                    .values()
                    .flat_map(|c| c.dependents.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_pending(&self, context: &ContextId) -> bool {
        self.contexts
            .get(context)
            .map(|state| state.context.is_none())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
