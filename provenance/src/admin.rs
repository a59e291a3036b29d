//! Admin set and owner for one resource.
//!
//! Invariants held after every successful mutation:
//! - the admin set is never empty
//! - the owner is always a member of the admin set
//! - members are unique and kept in insertion order
//!
//! Mutations are crate-private; outside of resource creation they happen
//! only when the proposal ledger applies an approved proposal.

use crate::error::Violation;
use crate::types::Address;

#[derive(Debug, Clone)]
pub struct AdminRegistry {
    owner: Address,
    admins: Vec<Address>,
}

impl AdminRegistry {
    /// Registry whose owner is also the sole admin.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            admins: vec![owner],
        }
    }

    /// Rebuild from exported state, checking every invariant.
    pub fn from_parts(owner: Address, admins: Vec<Address>) -> Result<Self, Violation> {
        if admins.is_empty() {
            return Err(Violation::EmptyAdminSet);
        }
        for (i, admin) in admins.iter().enumerate() {
            if admins[..i].contains(admin) {
                return Err(Violation::DuplicateAdmin(*admin));
            }
        }
        if !admins.contains(&owner) {
            return Err(Violation::OwnerNotAdmin(owner));
        }
        Ok(Self { owner, admins })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_admin(&self, identity: &Address) -> bool {
        self.admins.contains(identity)
    }

    /// Admins in insertion order.
    pub fn admins(&self) -> &[Address] {
        &self.admins
    }

    pub fn admin_count(&self) -> usize {
        self.admins.len()
    }

    /// Check that `identity` could be revoked without breaking an invariant.
    pub fn check_revoke(&self, identity: &Address) -> Result<(), Violation> {
        if !self.is_admin(identity) {
            return Err(Violation::NotAdmin(*identity));
        }
        if *identity == self.owner {
            return Err(Violation::OwnerRemoval(*identity));
        }
        if self.admins.len() <= 1 {
            return Err(Violation::LastAdmin(*identity));
        }
        Ok(())
    }

    /// Add an admin. Returns false if already a member.
    pub(crate) fn grant(&mut self, identity: Address) -> bool {
        if self.is_admin(&identity) {
            return false;
        }
        self.admins.push(identity);
        true
    }

    /// Remove an admin, refusing to drop the owner or the last admin.
    pub(crate) fn revoke(&mut self, identity: &Address) -> Result<(), Violation> {
        self.check_revoke(identity)?;
        self.admins.retain(|a| a != identity);
        Ok(())
    }

    /// Make `new_owner` the owner, granting admin if needed. The previous
    /// owner stays an admin. Returns whether a grant happened.
    pub(crate) fn transfer_ownership(&mut self, new_owner: Address) -> bool {
        let granted = self.grant(new_owner);
        self.owner = new_owner;
        granted
    }
}
