//! Export and restore of the full registry state.
//!
//! A snapshot is what an external durability layer stores between runs.
//! Restoring re-checks every invariant instead of trusting the input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admin::AdminRegistry;
use crate::config::EngineConfig;
use crate::error::{RegistryError, Result};
use crate::hashlog::{ChangeRecord, HashLog};
use crate::proposal::{Proposal, ProposalId, ProposalLedger};
use crate::registry::{Resource, ResourceRegistry};
use crate::types::{Address, ResourceId};

/// Serializable state of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: ResourceId,
    pub owner: Address,
    pub admins: Vec<Address>,
    pub active: bool,
    pub enforce_uniqueness: bool,
    pub created_sequence: u64,
    pub created_at: DateTime<Utc>,
    pub next_proposal_id: ProposalId,
    pub open_proposals: Vec<Proposal>,
    pub changes: Vec<ChangeRecord>,
}

/// Serializable state of the whole registry, excluding the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Last committed sequence
    pub sequence: u64,
    /// Resources sorted by identifier
    pub resources: Vec<ResourceSnapshot>,
}

impl RegistrySnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<&Resource> for ResourceSnapshot {
    fn from(resource: &Resource) -> Self {
        Self {
            id: resource.id.clone(),
            owner: resource.admins.owner(),
            admins: resource.admins.admins().to_vec(),
            active: resource.active,
            enforce_uniqueness: resource.enforce_uniqueness,
            created_sequence: resource.created_sequence,
            created_at: resource.created_at,
            next_proposal_id: resource.proposals.next_id(),
            open_proposals: resource.proposals.open_proposals().to_vec(),
            changes: resource.log.records().to_vec(),
        }
    }
}

impl TryFrom<ResourceSnapshot> for Resource {
    type Error = RegistryError;

    fn try_from(snapshot: ResourceSnapshot) -> Result<Self> {
        let id = snapshot.id;
        let admins = AdminRegistry::from_parts(snapshot.owner, snapshot.admins)
            .map_err(|v| RegistryError::violation(&id, v))?;
        let proposals =
            ProposalLedger::from_parts(snapshot.open_proposals, snapshot.next_proposal_id)
                .map_err(|v| RegistryError::violation(&id, v))?;
        let log = HashLog::from_records(snapshot.changes)
            .map_err(|v| RegistryError::violation(&id, v))?;

        Ok(Self {
            id,
            active: snapshot.active,
            enforce_uniqueness: snapshot.enforce_uniqueness,
            created_sequence: snapshot.created_sequence,
            created_at: snapshot.created_at,
            admins,
            proposals,
            log,
        })
    }
}

impl ResourceRegistry {
    /// Export the current state.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let resources = self
            .resource_ids()
            .iter()
            .filter_map(|id| self.resources.get(id))
            .map(ResourceSnapshot::from)
            .collect();

        RegistrySnapshot {
            sequence: self.sequence,
            resources,
        }
    }

    /// Rebuild a registry from a snapshot, validating every resource.
    pub fn restore(snapshot: RegistrySnapshot, config: EngineConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        registry.sequence = snapshot.sequence;

        for resource_snapshot in snapshot.resources {
            let resource = Resource::try_from(resource_snapshot)?;
            if registry.resources.contains_key(&resource.id) {
                return Err(RegistryError::AlreadyExists(resource.id));
            }
            registry.resources.insert(resource.id.clone(), resource);
        }

        info!(
            resources = registry.resources.len(),
            sequence = registry.sequence,
            "Registry restored from snapshot"
        );
        Ok(registry)
    }
}
