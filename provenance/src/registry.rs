//! Resource registry: the entry point for every operation.
//!
//! Each call names a resource. The registry checks that the resource exists
//! (and is active, for mutations that require it), authorizes the caller
//! through a single guard, then delegates to the admin registry, proposal
//! ledger or change log owned by that resource.
//!
//! Every mutating call either commits its full transition and returns a
//! [`Receipt`], or fails without changing any observable state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::admin::AdminRegistry;
use crate::config::EngineConfig;
use crate::error::{RegistryError, Result, Role};
use crate::events::{Event, EventLog};
use crate::hashlog::{ChangeRecord, HashLog};
use crate::proposal::{ApprovalPolicy, Proposal, ProposalKind, ProposalLedger};
use crate::receipt::Receipt;
use crate::types::{Address, ChangeType, DataHash, ResourceId};

/// Governance and change-tracking state of one resource.
#[derive(Debug, Clone)]
pub struct Resource {
    pub(crate) id: ResourceId,
    pub(crate) active: bool,
    pub(crate) enforce_uniqueness: bool,
    pub(crate) created_sequence: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) admins: AdminRegistry,
    pub(crate) proposals: ProposalLedger,
    pub(crate) log: HashLog,
}

impl Resource {
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn owner(&self) -> Address {
        self.admins.owner()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn enforces_uniqueness(&self) -> bool {
        self.enforce_uniqueness
    }

    /// Commit sequence of the creating call.
    pub fn created_sequence(&self) -> u64 {
        self.created_sequence
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn admins(&self) -> &AdminRegistry {
        &self.admins
    }

    pub fn proposals(&self) -> &ProposalLedger {
        &self.proposals
    }

    pub fn log(&self) -> &HashLog {
        &self.log
    }
}

/// Whether an operation may run against an inactive resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    AnyState,
    ActiveOnly,
}

/// Authoritative store of all resources.
#[derive(Debug)]
pub struct ResourceRegistry {
    pub(crate) config: EngineConfig,
    pub(crate) resources: HashMap<ResourceId, Resource>,
    /// Last committed sequence
    pub(crate) sequence: u64,
    pub(crate) events: EventLog,
}

impl ResourceRegistry {
    /// Create an empty registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty registry with custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let events = EventLog::with_max_entries(config.events.retention);
        Self {
            config,
            resources: HashMap::new(),
            sequence: 0,
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sequence of the last committed call.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Look up a resource.
    pub fn resource(&self, id: &ResourceId) -> Result<&Resource> {
        self.resources
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// All resource identifiers, sorted.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.resources.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    fn resource_mut(&mut self, id: &ResourceId) -> Result<&mut Resource> {
        self.resources
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Existence, then active status, then role.
    fn authorize(
        &self,
        id: &ResourceId,
        caller: &Address,
        role: Role,
        access: Access,
    ) -> Result<()> {
        let resource = self.resource(id)?;

        if access == Access::ActiveOnly && !resource.active {
            return Err(RegistryError::InactiveResource(id.clone()));
        }

        let allowed = match role {
            Role::Admin => resource.admins.is_admin(caller),
            Role::Owner => resource.admins.owner() == *caller,
        };
        if !allowed {
            return Err(RegistryError::Unauthorized {
                resource: id.clone(),
                caller: *caller,
                role,
            });
        }
        Ok(())
    }

    fn pending_sequence(&self) -> u64 {
        self.sequence + 1
    }

    fn commit(
        &mut self,
        operation: &str,
        id: &ResourceId,
        caller: Address,
        events: Vec<Event>,
    ) -> Receipt {
        self.sequence += 1;
        self.events.record(self.sequence, id, &events);
        Receipt::new(self.sequence, operation, id, caller, events)
    }

    fn policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::from(&self.config.governance)
    }

    // ---------------------------------------------------------------------
    // Resource lifecycle
    // ---------------------------------------------------------------------

    /// Create a resource owned and solely administered by `caller`.
    pub fn create_resource(
        &mut self,
        caller: Address,
        id: &ResourceId,
        enforce_uniqueness: bool,
    ) -> Result<Receipt> {
        if self.resources.contains_key(id) {
            return Err(RegistryError::AlreadyExists(id.clone()));
        }

        let resource = Resource {
            id: id.clone(),
            active: true,
            enforce_uniqueness,
            created_sequence: self.pending_sequence(),
            created_at: Utc::now(),
            admins: AdminRegistry::new(caller),
            proposals: ProposalLedger::new(),
            log: HashLog::new(),
        };
        self.resources.insert(id.clone(), resource);

        info!(resource = %id, owner = %caller, enforce_uniqueness, "Resource created");
        let events = vec![
            Event::ResourceCreated {
                owner: caller,
                enforce_uniqueness,
            },
            Event::AdminGranted { admin: caller },
        ];
        Ok(self.commit("create_resource", id, caller, events))
    }

    /// Activate or deactivate a resource. Setting the current value is a
    /// successful no-op.
    pub fn set_resource_active_status(
        &mut self,
        caller: Address,
        id: &ResourceId,
        active: bool,
    ) -> Result<Receipt> {
        self.authorize(id, &caller, Role::Admin, Access::AnyState)?;
        let resource = self.resource_mut(id)?;

        let mut events = Vec::new();
        if resource.active != active {
            resource.active = active;
            events.push(Event::ActiveStatusChanged { active });
            info!(resource = %id, active, by = %caller, "Resource active status changed");
        }
        Ok(self.commit("set_resource_active_status", id, caller, events))
    }

    /// Turn uniqueness enforcement on or off.
    pub fn set_uniqueness(
        &mut self,
        caller: Address,
        id: &ResourceId,
        enforce: bool,
    ) -> Result<Receipt> {
        self.authorize(id, &caller, Role::Admin, Access::AnyState)?;
        let resource = self.resource_mut(id)?;

        let mut events = Vec::new();
        if resource.enforce_uniqueness != enforce {
            resource.enforce_uniqueness = enforce;
            events.push(Event::UniquenessChanged { enforce });
            info!(resource = %id, enforce, by = %caller, "Uniqueness enforcement changed");
        }
        Ok(self.commit("set_uniqueness", id, caller, events))
    }

    pub fn is_resource_active(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.resource(id)?.active)
    }

    pub fn is_uniqueness_enforced(&self, id: &ResourceId) -> Result<bool> {
        Ok(self.resource(id)?.enforce_uniqueness)
    }

    pub fn get_resource_owner(&self, id: &ResourceId) -> Result<Address> {
        Ok(self.resource(id)?.owner())
    }

    // ---------------------------------------------------------------------
    // Admin queries
    // ---------------------------------------------------------------------

    pub fn is_admin(&self, id: &ResourceId, identity: &Address) -> Result<bool> {
        Ok(self.resource(id)?.admins.is_admin(identity))
    }

    /// Admins in the order they were granted.
    pub fn get_admins(&self, id: &ResourceId) -> Result<Vec<Address>> {
        Ok(self.resource(id)?.admins.admins().to_vec())
    }

    pub fn get_admin_count(&self, id: &ResourceId) -> Result<usize> {
        Ok(self.resource(id)?.admins.admin_count())
    }

    // ---------------------------------------------------------------------
    // Governance proposals
    // ---------------------------------------------------------------------

    pub fn propose_add_admin(
        &mut self,
        caller: Address,
        id: &ResourceId,
        target: Address,
    ) -> Result<Receipt> {
        self.propose(caller, id, ProposalKind::AddAdmin, target, "propose_add_admin")
    }

    pub fn propose_remove_admin(
        &mut self,
        caller: Address,
        id: &ResourceId,
        target: Address,
    ) -> Result<Receipt> {
        self.propose(
            caller,
            id,
            ProposalKind::RemoveAdmin,
            target,
            "propose_remove_admin",
        )
    }

    pub fn propose_transfer_ownership(
        &mut self,
        caller: Address,
        id: &ResourceId,
        new_owner: Address,
    ) -> Result<Receipt> {
        self.propose(
            caller,
            id,
            ProposalKind::TransferOwnership,
            new_owner,
            "propose_transfer_ownership",
        )
    }

    pub fn approve_add_admin(&mut self, caller: Address, id: &ResourceId) -> Result<Receipt> {
        self.approve(caller, id, ProposalKind::AddAdmin, "approve_add_admin")
    }

    pub fn approve_remove_admin(&mut self, caller: Address, id: &ResourceId) -> Result<Receipt> {
        self.approve(caller, id, ProposalKind::RemoveAdmin, "approve_remove_admin")
    }

    pub fn approve_transfer_ownership(
        &mut self,
        caller: Address,
        id: &ResourceId,
    ) -> Result<Receipt> {
        self.approve(
            caller,
            id,
            ProposalKind::TransferOwnership,
            "approve_transfer_ownership",
        )
    }

    /// Withdraw the most recent open proposal of `kind`.
    pub fn withdraw_proposal(
        &mut self,
        caller: Address,
        id: &ResourceId,
        kind: ProposalKind,
    ) -> Result<Receipt> {
        self.authorize(id, &caller, Role::Admin, Access::ActiveOnly)?;
        let resource = self.resource_mut(id)?;
        let events = resource
            .proposals
            .withdraw(&resource.id, &resource.admins, kind, caller)?;
        Ok(self.commit("withdraw_proposal", id, caller, events))
    }

    /// Open proposals in creation order.
    pub fn get_open_proposals(&self, id: &ResourceId) -> Result<Vec<Proposal>> {
        Ok(self.resource(id)?.proposals.open_proposals().to_vec())
    }

    fn propose(
        &mut self,
        caller: Address,
        id: &ResourceId,
        kind: ProposalKind,
        target: Address,
        operation: &str,
    ) -> Result<Receipt> {
        self.authorize(id, &caller, Role::Admin, Access::ActiveOnly)?;
        let policy = self.policy();
        let sequence = self.pending_sequence();

        let resource = self.resource_mut(id)?;
        let events = resource.proposals.propose(
            &resource.id,
            &mut resource.admins,
            policy,
            kind,
            target,
            caller,
            sequence,
        )?;
        Ok(self.commit(operation, id, caller, events))
    }

    fn approve(
        &mut self,
        caller: Address,
        id: &ResourceId,
        kind: ProposalKind,
        operation: &str,
    ) -> Result<Receipt> {
        self.authorize(id, &caller, Role::Admin, Access::ActiveOnly)?;
        let policy = self.policy();

        let resource = self.resource_mut(id)?;
        let events = resource
            .proposals
            .approve(&resource.id, &mut resource.admins, policy, kind, caller)?;
        Ok(self.commit(operation, id, caller, events))
    }

    // ---------------------------------------------------------------------
    // Change log
    // ---------------------------------------------------------------------

    /// Append a change record at the next version.
    pub fn register_change(
        &mut self,
        caller: Address,
        id: &ResourceId,
        data_hash: DataHash,
        change_type: ChangeType,
    ) -> Result<Receipt> {
        self.authorize(id, &caller, Role::Admin, Access::ActiveOnly)?;
        let change_type = change_type.normalized();
        let scope = self.config.ledger.uniqueness_scope;
        let sequence = self.pending_sequence();

        let resource = self.resource_mut(id)?;
        if resource.enforce_uniqueness && resource.log.is_duplicate(&data_hash, scope) {
            warn!(resource = %id, hash = %data_hash, ?scope, "Duplicate data hash rejected");
            return Err(RegistryError::DuplicateHash {
                resource: id.clone(),
                hash: data_hash,
            });
        }

        let version = resource.log.append(data_hash, change_type, caller, sequence).version;
        info!(
            resource = %id,
            version,
            hash = %data_hash,
            %change_type,
            author = %caller,
            "Change registered"
        );

        let events = vec![Event::ChangeRegistered {
            version,
            data_hash,
            change_type,
        }];
        Ok(self.commit("register_change", id, caller, events))
    }

    pub fn get_latest_change(&self, id: &ResourceId) -> Result<ChangeRecord> {
        self.resource(id)?
            .log
            .latest()
            .cloned()
            .ok_or_else(|| RegistryError::NoChanges(id.clone()))
    }

    /// Records with versions `start + 1 ..= start + count`, clipped to the
    /// recorded range. Never an error for an out-of-range window.
    pub fn get_history_range(
        &self,
        id: &ResourceId,
        start: u64,
        count: u64,
    ) -> Result<Vec<ChangeRecord>> {
        let records = self.resource(id)?.log.range(start, count).to_vec();
        debug!(resource = %id, start, count, returned = records.len(), "History range read");
        Ok(records)
    }

    pub fn get_version_count(&self, id: &ResourceId) -> Result<u64> {
        Ok(self.resource(id)?.log.version_count())
    }

    pub fn get_change(&self, id: &ResourceId, version: u64) -> Result<ChangeRecord> {
        self.resource(id)?
            .log
            .get(version)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownVersion {
                resource: id.clone(),
                version,
            })
    }

    /// Versions whose data hash equals `hash`, ascending.
    pub fn find_versions_by_hash(&self, id: &ResourceId, hash: &DataHash) -> Result<Vec<u64>> {
        Ok(self.resource(id)?.log.versions_with_hash(hash))
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GovernanceConfig;
    use crate::error::ErrorKind;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn rid(name: &str) -> ResourceId {
        ResourceId::new(name).unwrap()
    }

    #[test]
    fn test_create_resource() {
        let mut registry = ResourceRegistry::new();
        let id = rid("res1");

        let receipt = registry.create_resource(addr(1), &id, true).unwrap();
        assert_eq!(receipt.sequence, 1);
        assert!(receipt.events.contains(&Event::AdminGranted { admin: addr(1) }));

        assert_eq!(registry.get_resource_owner(&id).unwrap(), addr(1));
        assert!(registry.is_resource_active(&id).unwrap());
        assert!(registry.is_uniqueness_enforced(&id).unwrap());
        assert_eq!(registry.get_admin_count(&id).unwrap(), 1);
        assert!(registry.is_admin(&id, &addr(1)).unwrap());
        assert_eq!(registry.get_version_count(&id).unwrap(), 0);
        assert_eq!(registry.resource(&id).unwrap().created_sequence(), 1);
    }

    #[test]
    fn test_create_twice_fails_without_side_effects() {
        let mut registry = ResourceRegistry::new();
        let id = rid("res1");
        registry.create_resource(addr(1), &id, false).unwrap();

        let err = registry.create_resource(addr(2), &id, true).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyExists(id.clone()));
        assert_eq!(registry.get_resource_owner(&id).unwrap(), addr(1));
        assert_eq!(registry.sequence(), 1);
    }

    #[test]
    fn test_unknown_resource_reads_fail() {
        let registry = ResourceRegistry::new();
        let id = rid("missing");
        assert_eq!(registry.is_resource_active(&id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(registry.get_resource_owner(&id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(registry.get_admins(&id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_non_admin_cannot_mutate() {
        let mut registry = ResourceRegistry::new();
        let id = rid("res1");
        registry.create_resource(addr(1), &id, false).unwrap();

        let err = registry.set_resource_active_status(addr(2), &id, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = registry
            .register_change(addr(2), &id, DataHash::digest("x"), ChangeType::Create)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = registry.propose_add_admin(addr(2), &id, addr(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(registry.is_resource_active(&id).unwrap());
    }

    #[test]
    fn test_inactive_resource_blocks_mutations_but_not_reactivation() {
        let mut registry = ResourceRegistry::new();
        let id = rid("res1");
        registry.create_resource(addr(1), &id, false).unwrap();
        registry.set_resource_active_status(addr(1), &id, false).unwrap();

        let err = registry
            .register_change(addr(1), &id, DataHash::digest("x"), ChangeType::Create)
            .unwrap_err();
        assert_eq!(err, RegistryError::InactiveResource(id.clone()));
        let err = registry.propose_add_admin(addr(1), &id, addr(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InactiveResource);

        registry.set_uniqueness(addr(1), &id, true).unwrap();
        registry.set_resource_active_status(addr(1), &id, true).unwrap();
        registry
            .register_change(addr(1), &id, DataHash::digest("x"), ChangeType::Create)
            .unwrap();
    }

    #[test]
    fn test_idempotent_status_emits_no_events() {
        let mut registry = ResourceRegistry::new();
        let id = rid("res1");
        registry.create_resource(addr(1), &id, false).unwrap();

        let receipt = registry.set_resource_active_status(addr(1), &id, true).unwrap();
        assert!(receipt.events.is_empty());
        let receipt = registry.set_uniqueness(addr(1), &id, false).unwrap();
        assert!(receipt.events.is_empty());
        assert!(registry.is_resource_active(&id).unwrap());
    }

    #[test]
    fn test_full_governance_cycle_with_self_approval() {
        let config = EngineConfig {
            governance: GovernanceConfig::self_approval(),
            ..Default::default()
        };
        let mut registry = ResourceRegistry::with_config(config);
        let id = rid("governance-1");
        let owner = addr(1);
        let newcomer = addr(2);
        registry.create_resource(owner, &id, false).unwrap();

        registry.propose_add_admin(owner, &id, newcomer).unwrap();
        registry.approve_add_admin(owner, &id).unwrap();
        assert_eq!(registry.get_admins(&id).unwrap(), vec![owner, newcomer]);

        registry.propose_remove_admin(owner, &id, newcomer).unwrap();
        registry.approve_remove_admin(owner, &id).unwrap();
        assert_eq!(registry.get_admins(&id).unwrap(), vec![owner]);

        registry.propose_transfer_ownership(owner, &id, newcomer).unwrap();
        registry.approve_transfer_ownership(owner, &id).unwrap();
        assert_eq!(registry.get_resource_owner(&id).unwrap(), newcomer);
        assert_eq!(registry.get_admins(&id).unwrap(), vec![owner, newcomer]);
    }

    #[test]
    fn test_change_tracking() {
        let mut registry = ResourceRegistry::new();
        let id = rid("change-track");
        let author = addr(1);
        registry.create_resource(author, &id, false).unwrap();

        let first = DataHash::digest(r#"{"foo":"bar","v":1}"#);
        let second = DataHash::digest(r#"{"foo":"baz","v":2}"#);
        registry.register_change(author, &id, first, ChangeType::Create).unwrap();
        registry.register_change(author, &id, second, ChangeType::Update).unwrap();

        let latest = registry.get_latest_change(&id).unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.data_hash, second);
        assert_eq!(latest.change_type, ChangeType::Update);
        assert_eq!(latest.author, author);

        let history = registry.get_history_range(&id, 0, 5).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].data_hash, first);
        assert_eq!(history[1].version, 2);

        assert_eq!(registry.get_change(&id, 1).unwrap().data_hash, first);
        assert_eq!(registry.get_change(&id, 3).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(registry.find_versions_by_hash(&id, &second).unwrap(), vec![2]);
    }

    #[test]
    fn test_register_change_normalizes_low_custom_codes() {
        let mut registry = ResourceRegistry::new();
        let id = rid("codes");
        registry.create_resource(addr(1), &id, false).unwrap();

        let receipt = registry
            .register_change(addr(1), &id, DataHash::digest("x"), ChangeType::Custom(2))
            .unwrap();
        assert_eq!(registry.get_change(&id, 1).unwrap().change_type, ChangeType::Delete);
        assert!(receipt.events.contains(&Event::ChangeRegistered {
            version: 1,
            data_hash: DataHash::digest("x"),
            change_type: ChangeType::Delete,
        }));
    }

    #[test]
    fn test_latest_change_on_empty_log() {
        let mut registry = ResourceRegistry::new();
        let id = rid("empty");
        registry.create_resource(addr(1), &id, false).unwrap();

        let err = registry.get_latest_change(&id).unwrap_err();
        assert_eq!(err, RegistryError::NoChanges(id));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_events_are_logged_per_resource() {
        let mut registry = ResourceRegistry::new();
        let a = rid("a");
        let b = rid("b");
        registry.create_resource(addr(1), &a, false).unwrap();
        registry.create_resource(addr(1), &b, false).unwrap();
        registry.set_uniqueness(addr(1), &a, true).unwrap();

        let for_a = registry.events().for_resource(&a, 10);
        assert_eq!(for_a.len(), 3);
        assert_eq!(for_a[0].event, Event::UniquenessChanged { enforce: true });
        assert_eq!(registry.resource_ids(), vec![a, b]);
    }
}
