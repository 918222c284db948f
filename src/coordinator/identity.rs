//! # Workload identities and naming conflicts
//!
//! Maps transient config ids to stable, name-keyed workload identities.
//!
//! ## Rules
//! - At most one identity per name and at most one per config id. The
//!   `by_name` and `by_config` maps always point at entries of `identities`.
//! - A record that loses a naming conflict is *blocked*: queued under the
//!   contested name, in arrival order, until the owner is fully removed.
//! - A record for a config id whose identity is departing (renamed away or
//!   already uninstalling) is *deferred* on that config id and applied after
//!   the identity is removed and its name queue has been replayed.
//! - An identity leaves the maps only once its state machine reports that
//!   uninstall completed.

use crate::coordinator::error::CoordinatorError;
use crate::model::{ConfigId, ConfigRecord, ContextId, Phase};
use crate::workload::StateMachine;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId(u64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app#{}", self.0)
    }
}

/// One logically continuous named workload.
pub struct WorkloadIdentity {
    pub id: IdentityId,
    pub name: String,
    pub config: ConfigRecord,
    /// Key into the type support table.
    pub type_key: String,
    /// `None` once uninstall has been requested.
    pub state_machine: Option<Box<dyn StateMachine>>,
    /// The machine being uninstalled, kept alive until removal completes.
    pub retiring: Option<Box<dyn StateMachine>>,
    pub phase: Option<Phase>,
    pub recycle_context: Option<ContextId>,
    pub clean_cache_on_removal: bool,
}

impl WorkloadIdentity {
    pub fn config_id(&self) -> &ConfigId {
        &self.config.config_id
    }

    pub fn is_departing(&self) -> bool {
        self.state_machine.is_none()
    }

    /// Whether the state machine has reported at least once.
    pub fn is_configured(&self) -> bool {
        self.phase.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.phase == Some(Phase::Started)
    }
}

impl fmt::Debug for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadIdentity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config_id", self.config_id())
            .field("type", &self.type_key)
            .field("phase", &self.phase)
            .field("departing", &self.is_departing())
            .finish()
    }
}

/// How an incoming record relates to the known identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Known config id, same name.
    Update(IdentityId),
    /// Known config id whose identity is already being uninstalled.
    Departing(IdentityId),
    /// Known config id, new name that nobody owns.
    Rename(IdentityId),
    /// Known config id, new name owned by another identity.
    RenameConflict { identity: IdentityId, owner: IdentityId },
    /// Unknown config id, free name.
    Create,
    /// Unknown config id, name owned by another identity.
    Duplicate { owner: IdentityId },
}

#[derive(Default)]
pub struct IdentityTable {
    next_id: u64,
    identities: BTreeMap<IdentityId, WorkloadIdentity>,
    by_name: HashMap<String, IdentityId>,
    by_config: HashMap<ConfigId, IdentityId>,
    blocked_by_config: HashMap<ConfigId, (String, ConfigRecord)>,
    blocked_by_name: HashMap<String, VecDeque<ConfigId>>,
    deferred: HashMap<ConfigId, ConfigRecord>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, record: &ConfigRecord) -> Resolution {
        let from_config = self.by_config.get(&record.config_id).copied();
        let from_name = self.by_name.get(&record.name).copied();
        match (from_config, from_name) {
            (Some(identity), _) if self.is_departing(identity) => Resolution::Departing(identity),
            (Some(identity), Some(owner)) if identity == owner => Resolution::Update(identity),
            (Some(identity), Some(owner)) => Resolution::RenameConflict { identity, owner },
            (Some(identity), None) => Resolution::Rename(identity),
            (None, Some(owner)) => Resolution::Duplicate { owner },
            (None, None) => Resolution::Create,
        }
    }

    fn is_departing(&self, id: IdentityId) -> bool {
        self.identities
            .get(&id)
            .map(WorkloadIdentity::is_departing)
            .unwrap_or(false)
    }

    pub fn allocate_id(&mut self) -> IdentityId {
        self.next_id += 1;
        IdentityId(self.next_id)
    }

    /// Registers a new identity under its name and config id.
    pub fn insert(&mut self, identity: WorkloadIdentity) -> Result<IdentityId, CoordinatorError> {
        if let Some(owner) = self.by_name.get(&identity.name) {
            return Err(CoordinatorError::InvariantViolation(format!(
                "name {} already bound to {owner}",
                identity.name
            )));
        }
        if let Some(owner) = self.by_config.get(identity.config_id()) {
            return Err(CoordinatorError::InvariantViolation(format!(
                "config {} already bound to {owner}",
                identity.config_id()
            )));
        }
        let id = identity.id;
        self.by_name.insert(identity.name.clone(), id);
        self.by_config.insert(identity.config_id().clone(), id);
        self.identities.insert(id, identity);
        Ok(id)
    }

    pub fn get(&self, id: IdentityId) -> Option<&WorkloadIdentity> {
        self.identities.get(&id)
    }

    pub fn get_mut(&mut self, id: IdentityId) -> Option<&mut WorkloadIdentity> {
        self.identities.get_mut(&id)
    }

    pub fn id_for_name(&self, name: &str) -> Option<IdentityId> {
        self.by_name.get(name).copied()
    }

    pub fn id_for_config(&self, config_id: &ConfigId) -> Option<IdentityId> {
        self.by_config.get(config_id).copied()
    }

    pub fn by_config(&self, config_id: &ConfigId) -> Option<&WorkloadIdentity> {
        self.id_for_config(config_id).and_then(|id| self.get(id))
    }

    /// The identity a delete for `config_id` should act on.
    ///
    /// Fails when the name map disagrees with the config map.
    pub fn bound_for_delete(
        &self,
        config_id: &ConfigId,
    ) -> Result<Option<IdentityId>, CoordinatorError> {
        let Some(id) = self.id_for_config(config_id) else {
            return Ok(None);
        };
        let name = self.get(id).map(|identity| identity.name.as_str());
        let from_name = name.and_then(|n| self.id_for_name(n));
        if from_name != Some(id) {
            return Err(CoordinatorError::InvariantViolation(format!(
                "config {config_id} is bound to {id} but its name {} resolves to {from_name:?}",
                name.unwrap_or("<missing>")
            )));
        }
        Ok(Some(id))
    }

    /// Removes an identity. Map entries are only removed if they still point
    /// at this identity.
    pub fn remove(&mut self, id: IdentityId) -> Option<WorkloadIdentity> {
        let identity = self.identities.remove(&id)?;
        if self.by_name.get(&identity.name) == Some(&id) {
            self.by_name.remove(&identity.name);
        }
        if self.by_config.get(identity.config_id()) == Some(&id) {
            self.by_config.remove(identity.config_id());
        }
        Some(identity)
    }

    /// Queues `record` behind whoever owns `name`. A newer record for the same
    /// config id replaces the queued one and keeps its place.
    pub fn block(&mut self, record: ConfigRecord, name: &str) {
        let config_id = record.config_id.clone();
        if let Some((queued_under, _)) = self.blocked_by_config.get(&config_id) {
            if queued_under != name {
                let queued_under = queued_under.clone();
                self.dequeue(&queued_under, &config_id);
                self.blocked_by_name
                    .entry(name.to_string())
                    .or_default()
                    .push_back(config_id.clone());
            }
        } else {
            self.blocked_by_name
                .entry(name.to_string())
                .or_default()
                .push_back(config_id.clone());
        }
        self.blocked_by_config
            .insert(config_id, (name.to_string(), record));
    }

    pub fn is_blocked(&self, config_id: &ConfigId) -> bool {
        self.blocked_by_config.contains_key(config_id) || self.deferred.contains_key(config_id)
    }

    /// Holds `record` until the identity bound to its config id is removed.
    /// Only the newest deferred record per config id is kept.
    pub fn defer(&mut self, record: ConfigRecord) {
        self.deferred.insert(record.config_id.clone(), record);
    }

    pub fn take_deferred(&mut self, config_id: &ConfigId) -> Option<ConfigRecord> {
        self.deferred.remove(config_id)
    }

    /// Drops a blocked or deferred record, returning it if there was one.
    pub fn unblock(&mut self, config_id: &ConfigId) -> Option<ConfigRecord> {
        let deferred = self.deferred.remove(config_id);
        let blocked = self
            .blocked_by_config
            .remove(config_id)
            .map(|(name, record)| {
                self.dequeue(&name, config_id);
                record
            });
        blocked.or(deferred)
    }

    /// Oldest record queued under `name`.
    pub fn pop_blocked(&mut self, name: &str) -> Option<ConfigRecord> {
        loop {
            let queue = self.blocked_by_name.get_mut(name)?;
            let Some(config_id) = queue.pop_front() else {
                self.blocked_by_name.remove(name);
                return None;
            };
            if queue.is_empty() {
                self.blocked_by_name.remove(name);
            }
            if let Some((_, record)) = self.blocked_by_config.remove(&config_id) {
                return Some(record);
            }
        }
    }

    fn dequeue(&mut self, name: &str, config_id: &ConfigId) {
        if let Some(queue) = self.blocked_by_name.get_mut(name) {
            queue.retain(|queued| queued != config_id);
            if queue.is_empty() {
                self.blocked_by_name.remove(name);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkloadIdentity> {
        self.identities.values()
    }

    pub fn ids(&self) -> Vec<IdentityId> {
        self.identities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Empties every map and queue, returning the identities.
    pub fn clear(&mut self) -> Vec<WorkloadIdentity> {
        self.by_name.clear();
        self.by_config.clear();
        self.blocked_by_config.clear();
        self.blocked_by_name.clear();
        self.deferred.clear();
        std::mem::take(&mut self.identities).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::properties;

    fn record(config_id: &str, name: &str) -> ConfigRecord {
        ConfigRecord::parse(
            config_id.into(),
            properties([("location", format!("apps/{name}.war")), ("name", name.to_string())]),
        )
        .unwrap()
    }

    fn identity(table: &mut IdentityTable, record: ConfigRecord) -> IdentityId {
        let id = table.allocate_id();
        table
            .insert(WorkloadIdentity {
                id,
                name: record.name.clone(),
                type_key: record.app_type.clone(),
                config: record,
                state_machine: None,
                retiring: None,
                phase: None,
                recycle_context: None,
                clean_cache_on_removal: false,
            })
            .unwrap()
    }

    struct Idle;

    impl StateMachine for Idle {
        fn configure(&self, _: &ConfigRecord, _: crate::workload::ConfigureSignals) {}
        fn recycle(&self, _: crate::workload::RecycleSignals) {}
        fn uninstall(&self, removed: signal_framework::Signal) {
            removed.succeed();
        }
        fn start(&self) {}
        fn stop(&self) {}
        fn restart(&self) {}
        fn set_app_handler(&self, _: Option<crate::workload::AppHandler>) {}
        fn is_blocked(&self) -> bool {
            false
        }
    }

    fn live(table: &mut IdentityTable, record: ConfigRecord) -> IdentityId {
        let id = identity(table, record);
        table.get_mut(id).unwrap().state_machine = Some(Box::new(Idle));
        id
    }

    #[test]
    fn classifies_every_case() {
        let mut table = IdentityTable::new();
        let orders = live(&mut table, record("42", "orders"));
        let billing = live(&mut table, record("9", "billing"));

        assert_eq!(table.classify(&record("42", "orders")), Resolution::Update(orders));
        assert_eq!(table.classify(&record("42", "orders2")), Resolution::Rename(orders));
        assert_eq!(
            table.classify(&record("42", "billing")),
            Resolution::RenameConflict {
                identity: orders,
                owner: billing
            }
        );
        assert_eq!(table.classify(&record("1", "fresh")), Resolution::Create);
        assert_eq!(
            table.classify(&record("7", "billing")),
            Resolution::Duplicate { owner: billing }
        );

        table.get_mut(orders).unwrap().state_machine = None;
        assert_eq!(table.classify(&record("42", "orders")), Resolution::Departing(orders));
    }

    #[test]
    fn insert_rejects_a_taken_name() {
        let mut table = IdentityTable::new();
        identity(&mut table, record("9", "billing"));
        let id = table.allocate_id();
        let clash = record("7", "billing");
        let err = table
            .insert(WorkloadIdentity {
                id,
                name: clash.name.clone(),
                type_key: clash.app_type.clone(),
                config: clash,
                state_machine: None,
                retiring: None,
                phase: None,
                recycle_context: None,
                clean_cache_on_removal: false,
            })
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvariantViolation(_)));
    }

    #[test]
    fn blocked_records_replay_in_arrival_order() {
        let mut table = IdentityTable::new();
        table.block(record("7", "billing"), "billing");
        table.block(record("8", "billing"), "billing");
        // A newer record for 7 keeps its place in the queue.
        table.block(record("7", "billing"), "billing");

        assert!(table.is_blocked(&ConfigId::from("7")));
        assert_eq!(table.pop_blocked("billing").unwrap().config_id, ConfigId::from("7"));
        assert_eq!(table.pop_blocked("billing").unwrap().config_id, ConfigId::from("8"));
        assert!(table.pop_blocked("billing").is_none());
    }

    #[test]
    fn unblocking_removes_from_the_queue() {
        let mut table = IdentityTable::new();
        table.block(record("7", "billing"), "billing");
        table.block(record("8", "billing"), "billing");
        assert!(table.unblock(&ConfigId::from("7")).is_some());
        assert!(table.unblock(&ConfigId::from("7")).is_none());
        assert_eq!(table.pop_blocked("billing").unwrap().config_id, ConfigId::from("8"));
    }

    #[test]
    fn deferred_record_is_kept_apart_from_the_name_queue() {
        let mut table = IdentityTable::new();
        table.block(record("7", "billing"), "billing");
        table.defer(record("9", "billing2"));
        table.defer(record("9", "billing3"));

        assert!(table.is_blocked(&ConfigId::from("9")));
        assert_eq!(table.pop_blocked("billing").unwrap().config_id, ConfigId::from("7"));
        assert!(table.pop_blocked("billing").is_none());
        assert_eq!(table.take_deferred(&ConfigId::from("9")).unwrap().name, "billing3");
        assert!(table.take_deferred(&ConfigId::from("9")).is_none());
    }

    #[test]
    fn unblock_drops_a_deferred_record() {
        let mut table = IdentityTable::new();
        table.defer(record("9", "billing2"));
        assert!(table.unblock(&ConfigId::from("9")).is_some());
        assert!(!table.is_blocked(&ConfigId::from("9")));
    }

    #[test]
    fn remove_leaves_maps_owned_by_others() {
        let mut table = IdentityTable::new();
        let old = identity(&mut table, record("42", "orders"));
        // Simulate the name being rebound while the old identity is departing.
        table.by_name.remove("orders");
        let replacement = identity(&mut table, record("43", "orders"));

        let removed = table.remove(old).unwrap();
        assert_eq!(removed.name, "orders");
        assert_eq!(table.id_for_name("orders"), Some(replacement));
        assert_eq!(table.id_for_config(&ConfigId::from("42")), None);
    }

    #[test]
    fn delete_detects_inconsistent_maps() {
        let mut table = IdentityTable::new();
        let orders = identity(&mut table, record("42", "orders"));
        assert_eq!(table.bound_for_delete(&ConfigId::from("42")), Ok(Some(orders)));

        table.by_name.remove("orders");
        assert!(matches!(
            table.bound_for_delete(&ConfigId::from("42")),
            Err(CoordinatorError::InvariantViolation(_))
        ));
    }
}
