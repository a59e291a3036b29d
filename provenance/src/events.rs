//! Event records emitted by committed transitions.
//!
//! Events are carried in each [`Receipt`](crate::receipt::Receipt) and kept
//! in a bounded [`EventLog`] for later inspection. The change log, not the
//! event log, is the authoritative audit trail of content hashes.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proposal::{ProposalId, ProposalKind};
use crate::types::{Address, ChangeType, DataHash, ResourceId};

/// A state change observed by a committed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ResourceCreated {
        owner: Address,
        enforce_uniqueness: bool,
    },
    AdminGranted {
        admin: Address,
    },
    AdminRevoked {
        admin: Address,
    },
    ActiveStatusChanged {
        active: bool,
    },
    UniquenessChanged {
        enforce: bool,
    },
    ProposalOpened {
        proposal_id: ProposalId,
        kind: ProposalKind,
        target: Address,
        proposer: Address,
    },
    ProposalApproved {
        proposal_id: ProposalId,
        kind: ProposalKind,
        approver: Address,
        /// Parties counted so far, including the proposer when it counts
        tally: usize,
    },
    ProposalApplied {
        proposal_id: ProposalId,
        kind: ProposalKind,
        target: Address,
    },
    ProposalWithdrawn {
        proposal_id: ProposalId,
        kind: ProposalKind,
        target: Address,
    },
    ProposalSuperseded {
        proposal_id: ProposalId,
        kind: ProposalKind,
        target: Address,
    },
    OwnershipTransferred {
        from: Address,
        to: Address,
    },
    ChangeRegistered {
        version: u64,
        data_hash: DataHash,
        change_type: ChangeType,
    },
}

/// An event with its commit context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique record ID
    pub record_id: String,
    /// Commit sequence of the call that emitted it
    pub sequence: u64,
    /// Resource the event concerns
    pub resource: ResourceId,
    /// The event itself
    pub event: Event,
    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Bounded log of event records, newest first.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<EventRecord>,
    max_entries: usize,
}

impl EventLog {
    /// Create a log retaining at most `max_entries` records.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    /// Record every event of one committed call.
    pub(crate) fn record(&mut self, sequence: u64, resource: &ResourceId, events: &[Event]) {
        let recorded_at = Utc::now();
        for event in events {
            self.entries.push_front(EventRecord {
                record_id: uuid::Uuid::new_v4().to_string(),
                sequence,
                resource: resource.clone(),
                event: event.clone(),
                recorded_at,
            });
        }

        // Prune if over limit
        while self.entries.len() > self.max_entries {
            self.entries.pop_back();
        }
    }

    /// Most recent records.
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        self.entries.iter().take(limit).cloned().collect()
    }

    /// Most recent records for one resource.
    pub fn for_resource(&self, resource: &ResourceId, limit: usize) -> Vec<EventRecord> {
        self.entries
            .iter()
            .filter(|e| &e.resource == resource)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_max_entries(10_000)
    }
}
