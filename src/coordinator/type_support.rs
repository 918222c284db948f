//! Per-type readiness: is the type recognised, and is a handler installed?

use crate::coordinator::identity::IdentityId;
use crate::workload::AppHandler;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct TypeSupport {
    pub supported: bool,
    pub handler: Option<AppHandler>,
    /// Identities that still need the handler pushed to their state machine.
    pub waiting: BTreeSet<IdentityId>,
}

impl TypeSupport {
    pub fn is_ready(&self) -> bool {
        self.supported && self.handler.is_some()
    }
}

#[derive(Debug, Default)]
pub struct TypeSupportTable {
    types: BTreeMap<String, TypeSupport>,
}

impl TypeSupportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, app_type: &str) -> Option<&TypeSupport> {
        self.types.get(app_type)
    }

    pub fn entry(&mut self, app_type: &str) -> &mut TypeSupport {
        self.types.entry(app_type.to_string()).or_default()
    }

    /// The handler to bind for `identity`. Parks the identity on the waiting
    /// list when the type is not ready.
    pub fn bind(&mut self, app_type: &str, identity: IdentityId) -> Option<AppHandler> {
        let support = self.entry(app_type);
        if support.is_ready() {
            support.handler.clone()
        } else {
            support.waiting.insert(identity);
            None
        }
    }

    /// Takes the waiting list once the type is ready.
    pub fn release_waiting(&mut self, app_type: &str) -> Option<(AppHandler, Vec<IdentityId>)> {
        let support = self.types.get_mut(app_type)?;
        if !support.is_ready() {
            return None;
        }
        let handler = support.handler.clone()?;
        let waiting = std::mem::take(&mut support.waiting);
        Some((handler, waiting.into_iter().collect()))
    }

    /// Removes `identity` from every waiting list.
    pub fn forget(&mut self, identity: IdentityId) {
        for support in self.types.values_mut() {
            support.waiting.remove(&identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::identity::IdentityTable;

    #[test]
    fn identities_wait_until_both_halves_are_present() {
        let mut ids = IdentityTable::new();
        let first = ids.allocate_id();
        let mut table = TypeSupportTable::new();

        assert_eq!(table.bind("war", first), None);
        table.entry("war").handler = Some(AppHandler::new("war", "web"));
        assert!(table.release_waiting("war").is_none());

        table.entry("war").supported = true;
        let (handler, waiting) = table.release_waiting("war").unwrap();
        assert_eq!(handler.name, "web");
        assert_eq!(waiting, vec![first]);
        assert!(table.get("war").unwrap().waiting.is_empty());
    }

    #[test]
    fn ready_type_binds_immediately() {
        let mut ids = IdentityTable::new();
        let id = ids.allocate_id();
        let mut table = TypeSupportTable::new();
        let support = table.entry("rar");
        support.supported = true;
        support.handler = Some(AppHandler::new("rar", "connectors"));

        assert!(table.bind("rar", id).is_some());
        assert!(table.get("rar").unwrap().waiting.is_empty());
    }

    #[test]
    fn forget_clears_waiting_entries() {
        let mut ids = IdentityTable::new();
        let id = ids.allocate_id();
        let mut table = TypeSupportTable::new();
        table.bind("war", id);
        table.forget(id);
        assert!(table.get("war").unwrap().waiting.is_empty());
    }
}
