//! Governance proposals and their approval state machine.
//!
//! A proposal is `Open` while it collects approvals. It leaves the ledger
//! when it is applied (threshold reached and effect committed), withdrawn,
//! or superseded. A later proposal for the same kind and target starts
//! from an empty approval set.
//!
//! Applying a proposal is all-or-nothing: the effect is checked against the
//! admin registry before anything is mutated, so a rejected application
//! leaves both the proposal and the registry exactly as they were.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::admin::AdminRegistry;
use crate::config::GovernanceConfig;
use crate::error::{RegistryError, Result, Role, Violation};
use crate::events::Event;
use crate::types::{Address, ResourceId};

/// Per-resource proposal identifier.
pub type ProposalId = u64;

/// Governance action a proposal carries out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    AddAdmin,
    RemoveAdmin,
    TransferOwnership,
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddAdmin => f.write_str("add-admin"),
            Self::RemoveAdmin => f.write_str("remove-admin"),
            Self::TransferOwnership => f.write_str("transfer-ownership"),
        }
    }
}

/// An open governance proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub kind: ProposalKind,
    pub target: Address,
    pub proposer: Address,
    /// Distinct approvers in approval order
    pub approvals: Vec<Address>,
    /// Commit sequence of the proposing call
    pub opened_sequence: u64,
    pub opened_at: DateTime<Utc>,
}

/// How many parties a proposal needs, and whether the proposer is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    pub threshold: usize,
    pub proposer_counts: bool,
}

impl ApprovalPolicy {
    /// Parties counted toward the threshold so far. Only current admins
    /// count; approvals from revoked admins are ignored.
    pub fn tally(&self, proposal: &Proposal, admins: &AdminRegistry) -> usize {
        let proposer = self.proposer_counts && admins.is_admin(&proposal.proposer);
        let approvers = proposal
            .approvals
            .iter()
            .filter(|a| admins.is_admin(a))
            .count();
        approvers + usize::from(proposer)
    }

    pub fn is_met(&self, proposal: &Proposal, admins: &AdminRegistry) -> bool {
        self.tally(proposal, admins) >= self.threshold
    }
}

impl From<&GovernanceConfig> for ApprovalPolicy {
    fn from(config: &GovernanceConfig) -> Self {
        Self {
            threshold: config.approval_threshold,
            proposer_counts: config.proposer_counts,
        }
    }
}

/// Open proposals for one resource, in creation order.
#[derive(Debug, Clone, Default)]
pub struct ProposalLedger {
    open: Vec<Proposal>,
    next_id: ProposalId,
}

impl ProposalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from exported state. Proposal ids must be unique, at most
    /// one proposal may be open per kind and target, and no approver may
    /// appear twice. The id counter never moves backwards past an existing id.
    pub fn from_parts(
        open: Vec<Proposal>,
        next_id: ProposalId,
    ) -> std::result::Result<Self, Violation> {
        let mut next = next_id;
        for (i, proposal) in open.iter().enumerate() {
            let earlier = &open[..i];
            if earlier.iter().any(|p| p.id == proposal.id) {
                return Err(Violation::DuplicateProposal(proposal.id));
            }
            if earlier
                .iter()
                .any(|p| p.kind == proposal.kind && p.target == proposal.target)
            {
                return Err(Violation::DuplicateOpenProposal {
                    kind: proposal.kind,
                    target: proposal.target,
                });
            }
            for (j, approver) in proposal.approvals.iter().enumerate() {
                if proposal.approvals[..j].contains(approver) {
                    return Err(Violation::DuplicateApproval {
                        proposal: proposal.id,
                        approver: *approver,
                    });
                }
            }
            next = next.max(proposal.id.saturating_add(1));
        }
        Ok(Self { open, next_id: next })
    }

    pub fn open_proposals(&self) -> &[Proposal] {
        &self.open
    }

    /// Identifier the next proposal will receive.
    pub fn next_id(&self) -> ProposalId {
        self.next_id
    }

    /// Most recently opened proposal of `kind`.
    pub fn latest_open(&self, kind: ProposalKind) -> Option<&Proposal> {
        self.open.iter().rev().find(|p| p.kind == kind)
    }

    fn latest_index(&self, kind: ProposalKind) -> Option<usize> {
        self.open.iter().rposition(|p| p.kind == kind)
    }

    /// Open a proposal. If the policy is already satisfied by the proposer
    /// alone, the proposal applies within this call.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn propose(
        &mut self,
        resource: &ResourceId,
        admins: &mut AdminRegistry,
        policy: ApprovalPolicy,
        kind: ProposalKind,
        target: Address,
        proposer: Address,
        sequence: u64,
    ) -> Result<Vec<Event>> {
        let precondition = match kind {
            ProposalKind::AddAdmin if admins.is_admin(&target) => {
                Some(Violation::AlreadyAdmin(target))
            }
            ProposalKind::RemoveAdmin if !admins.is_admin(&target) => {
                Some(Violation::NotAdmin(target))
            }
            ProposalKind::TransferOwnership if admins.owner() == target => {
                Some(Violation::AlreadyOwner(target))
            }
            _ => None,
        };
        if let Some(violation) = precondition {
            return Err(RegistryError::violation(resource, violation));
        }

        if self.open.iter().any(|p| p.kind == kind && p.target == target) {
            return Err(RegistryError::Conflict {
                resource: resource.clone(),
                kind,
                target,
            });
        }

        let proposal = Proposal {
            id: self.next_id,
            kind,
            target,
            proposer,
            approvals: Vec::new(),
            opened_sequence: sequence,
            opened_at: Utc::now(),
        };

        let mut events = vec![Event::ProposalOpened {
            proposal_id: proposal.id,
            kind,
            target,
            proposer,
        }];

        if policy.is_met(&proposal, admins) {
            check_effect(admins, &proposal).map_err(|violation| {
                warn!(
                    resource = %resource,
                    %kind,
                    %target,
                    %violation,
                    "Proposal rejected on immediate application"
                );
                RegistryError::violation(resource, violation)
            })?;
            self.next_id += 1;
            self.apply(resource, admins, proposal, &mut events)?;
        } else {
            info!(
                resource = %resource,
                proposal_id = proposal.id,
                %kind,
                %target,
                %proposer,
                "Proposal opened"
            );
            self.next_id += 1;
            self.open.push(proposal);
        }

        Ok(events)
    }

    /// Approve the most recent open proposal of `kind`. Applies it when the
    /// approval reaches the threshold.
    pub(crate) fn approve(
        &mut self,
        resource: &ResourceId,
        admins: &mut AdminRegistry,
        policy: ApprovalPolicy,
        kind: ProposalKind,
        approver: Address,
    ) -> Result<Vec<Event>> {
        let index = self
            .latest_index(kind)
            .ok_or_else(|| RegistryError::NoOpenProposal {
                resource: resource.clone(),
                kind,
            })?;
        let proposal = &self.open[index];

        let proposer_already_counted = policy.proposer_counts && proposal.proposer == approver;
        if proposer_already_counted || proposal.approvals.contains(&approver) {
            return Err(RegistryError::AlreadyApproved {
                resource: resource.clone(),
                kind,
                approver,
            });
        }

        let tally = policy.tally(proposal, admins) + 1;
        let reaches_threshold = tally >= policy.threshold;

        if reaches_threshold {
            // Validate before touching anything so a rejection consumes nothing.
            check_effect(admins, proposal).map_err(|violation| {
                warn!(
                    resource = %resource,
                    proposal_id = proposal.id,
                    %kind,
                    %violation,
                    "Approval rejected; proposal stays open"
                );
                RegistryError::violation(resource, violation)
            })?;
        }

        let mut events = vec![Event::ProposalApproved {
            proposal_id: proposal.id,
            kind,
            approver,
            tally,
        }];
        debug!(
            resource = %resource,
            proposal_id = proposal.id,
            %approver,
            tally,
            "Proposal approved"
        );

        if reaches_threshold {
            let mut proposal = self.open.remove(index);
            proposal.approvals.push(approver);
            self.apply(resource, admins, proposal, &mut events)?;
        } else {
            self.open[index].approvals.push(approver);
        }

        Ok(events)
    }

    /// Withdraw the most recent open proposal of `kind`. Only its proposer
    /// or the resource owner may do so.
    pub(crate) fn withdraw(
        &mut self,
        resource: &ResourceId,
        admins: &AdminRegistry,
        kind: ProposalKind,
        caller: Address,
    ) -> Result<Vec<Event>> {
        let index = self
            .latest_index(kind)
            .ok_or_else(|| RegistryError::NoOpenProposal {
                resource: resource.clone(),
                kind,
            })?;

        let proposal = &self.open[index];
        if proposal.proposer != caller && admins.owner() != caller {
            return Err(RegistryError::Unauthorized {
                resource: resource.clone(),
                caller,
                role: Role::Owner,
            });
        }

        let proposal = self.open.remove(index);
        info!(
            resource = %resource,
            proposal_id = proposal.id,
            %kind,
            %caller,
            "Proposal withdrawn"
        );
        Ok(vec![Event::ProposalWithdrawn {
            proposal_id: proposal.id,
            kind,
            target: proposal.target,
        }])
    }

    /// Commit a proposal's effect. The caller has already run
    /// [`check_effect`] against the same registry state.
    fn apply(
        &mut self,
        resource: &ResourceId,
        admins: &mut AdminRegistry,
        proposal: Proposal,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        let target = proposal.target;
        match proposal.kind {
            ProposalKind::AddAdmin => {
                if admins.grant(target) {
                    events.push(Event::AdminGranted { admin: target });
                }
            }
            ProposalKind::RemoveAdmin => {
                admins
                    .revoke(&target)
                    .map_err(|violation| RegistryError::violation(resource, violation))?;
                events.push(Event::AdminRevoked { admin: target });
            }
            ProposalKind::TransferOwnership => {
                let from = admins.owner();
                if admins.transfer_ownership(target) {
                    events.push(Event::AdminGranted { admin: target });
                }
                events.push(Event::OwnershipTransferred { from, to: target });
                info!(resource = %resource, %from, to = %target, "Ownership transferred");
            }
        }

        events.push(Event::ProposalApplied {
            proposal_id: proposal.id,
            kind: proposal.kind,
            target,
        });
        info!(
            resource = %resource,
            proposal_id = proposal.id,
            kind = %proposal.kind,
            %target,
            approvals = proposal.approvals.len(),
            "Proposal applied"
        );

        if proposal.kind == ProposalKind::TransferOwnership {
            self.supersede(resource, ProposalKind::TransferOwnership, events);
        }
        Ok(())
    }

    /// Discard every open proposal of `kind`.
    fn supersede(&mut self, resource: &ResourceId, kind: ProposalKind, events: &mut Vec<Event>) {
        let (stale, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.open)
            .into_iter()
            .partition(|p| p.kind == kind);
        self.open = keep;

        for proposal in stale {
            debug!(resource = %resource, proposal_id = proposal.id, %kind, "Proposal superseded");
            events.push(Event::ProposalSuperseded {
                proposal_id: proposal.id,
                kind,
                target: proposal.target,
            });
        }
    }
}

/// Whether applying `proposal` now would keep the admin invariants.
fn check_effect(admins: &AdminRegistry, proposal: &Proposal) -> std::result::Result<(), Violation> {
    match proposal.kind {
        // Granting an existing admin is a no-op.
        ProposalKind::AddAdmin => Ok(()),
        ProposalKind::RemoveAdmin => admins.check_revoke(&proposal.target),
        ProposalKind::TransferOwnership if admins.owner() == proposal.target => {
            Err(Violation::AlreadyOwner(proposal.target))
        }
        ProposalKind::TransferOwnership => Ok(()),
    }
}
