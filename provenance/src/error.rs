//! Error taxonomy for registry operations.
//!
//! Every failure names the resource and, where relevant, the identity that
//! triggered it. [`RegistryError::kind`] collapses the variants onto the
//! coarse taxonomy callers match on.

use serde::{Deserialize, Serialize};

use crate::proposal::ProposalKind;
use crate::types::{Address, DataHash, ResourceId};

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Unauthorized,
    InactiveResource,
    Conflict,
    AlreadyApproved,
    InvariantViolation,
    DuplicateHash,
}

/// Role a caller needs for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Member of the resource's admin set
    Admin,
    /// The resource's current owner
    Owner,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Owner => f.write_str("owner"),
        }
    }
}

/// The specific invariant a rejected transition would have broken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("{0} is the last admin")]
    LastAdmin(Address),

    #[error("{0} is the owner; transfer ownership before removing")]
    OwnerRemoval(Address),

    #[error("{0} is already an admin")]
    AlreadyAdmin(Address),

    #[error("{0} is not an admin")]
    NotAdmin(Address),

    #[error("{0} is already the owner")]
    AlreadyOwner(Address),

    #[error("owner {0} is not in the admin set")]
    OwnerNotAdmin(Address),

    #[error("admin set is empty")]
    EmptyAdminSet,

    #[error("{0} appears more than once in the admin set")]
    DuplicateAdmin(Address),

    #[error("expected version {expected}, found {found}")]
    VersionGap { expected: u64, found: u64 },

    #[error("proposal id {0} is used more than once")]
    DuplicateProposal(u64),

    #[error("more than one open {kind} proposal for {target}")]
    DuplicateOpenProposal { kind: ProposalKind, target: Address },

    #[error("{approver} approved proposal {proposal} more than once")]
    DuplicateApproval { proposal: u64, approver: Address },
}

/// Errors returned by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Resource identifier is unknown
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// Resource identifier is already taken
    #[error("resource already exists: {0}")]
    AlreadyExists(ResourceId),

    /// Caller lacks the role required by the operation
    #[error("{caller} is not {role} of resource {resource}")]
    Unauthorized {
        resource: ResourceId,
        caller: Address,
        role: Role,
    },

    /// Mutation attempted on a deactivated resource
    #[error("resource {0} is inactive")]
    InactiveResource(ResourceId),

    /// An open proposal with the same kind and target exists
    #[error("an open {kind} proposal for {target} already exists on resource {resource}")]
    Conflict {
        resource: ResourceId,
        kind: ProposalKind,
        target: Address,
    },

    /// Caller already approved, or opened, the proposal
    #[error("{approver} already approved the open {kind} proposal on resource {resource}")]
    AlreadyApproved {
        resource: ResourceId,
        kind: ProposalKind,
        approver: Address,
    },

    /// Transition would break an admin-set or ownership invariant
    #[error("invariant violation on resource {resource}: {violation}")]
    InvariantViolation {
        resource: ResourceId,
        violation: Violation,
    },

    /// Uniqueness enforcement rejected a repeated data hash
    #[error("data hash {hash} is a duplicate on resource {resource}")]
    DuplicateHash { resource: ResourceId, hash: DataHash },

    /// No open proposal of the requested kind
    #[error("no open {kind} proposal on resource {resource}")]
    NoOpenProposal {
        resource: ResourceId,
        kind: ProposalKind,
    },

    /// Change log is empty
    #[error("no changes recorded for resource {0}")]
    NoChanges(ResourceId),

    /// Requested version was never recorded
    #[error("resource {resource} has no version {version}")]
    UnknownVersion { resource: ResourceId, version: u64 },
}

impl RegistryError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_)
            | Self::NoOpenProposal { .. }
            | Self::NoChanges(_)
            | Self::UnknownVersion { .. } => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InactiveResource(_) => ErrorKind::InactiveResource,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::AlreadyApproved { .. } => ErrorKind::AlreadyApproved,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            Self::DuplicateHash { .. } => ErrorKind::DuplicateHash,
        }
    }

    pub(crate) fn violation(resource: &ResourceId, violation: Violation) -> Self {
        Self::InvariantViolation {
            resource: resource.clone(),
            violation,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let id = ResourceId::new("r1").unwrap();

        assert_eq!(RegistryError::NotFound(id.clone()).kind(), ErrorKind::NotFound);
        assert_eq!(RegistryError::NoChanges(id.clone()).kind(), ErrorKind::NotFound);
        assert_eq!(
            RegistryError::NoOpenProposal {
                resource: id.clone(),
                kind: ProposalKind::AddAdmin,
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            RegistryError::violation(&id, Violation::EmptyAdminSet).kind(),
            ErrorKind::InvariantViolation
        );
    }

    #[test]
    fn test_messages_carry_context() {
        let id = ResourceId::new("governance-1").unwrap();
        let caller = Address::from_bytes([0xab; 20]);

        let err = RegistryError::Unauthorized {
            resource: id,
            caller,
            role: Role::Admin,
        };
        let msg = err.to_string();
        assert!(msg.contains("governance-1"));
        assert!(msg.contains("0xabab"));
        assert!(msg.contains("admin"));
    }
}
