//! Commit handles returned by mutating calls.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::events::Event;
use crate::types::{Address, ResourceId, TxHash};

/// Proof that a mutating call was accepted and committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Opaque commit handle
    pub tx_hash: TxHash,
    /// Registry-wide commit sequence
    pub sequence: u64,
    /// Operation name
    pub operation: String,
    /// Resource the call addressed
    pub resource: ResourceId,
    /// Identity that made the call
    pub caller: Address,
    /// State changes, empty for idempotent no-ops
    pub events: Vec<Event>,
}

impl Receipt {
    pub(crate) fn new(
        sequence: u64,
        operation: &str,
        resource: &ResourceId,
        caller: Address,
        events: Vec<Event>,
    ) -> Self {
        Self {
            tx_hash: compute_tx_hash(sequence, operation, resource, &caller),
            sequence,
            operation: operation.to_string(),
            resource: resource.clone(),
            caller,
            events,
        }
    }
}

/// SHA-256 over the commit sequence, operation, resource and caller.
pub fn compute_tx_hash(
    sequence: u64,
    operation: &str,
    resource: &ResourceId,
    caller: &Address,
) -> TxHash {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_be_bytes());
    hasher.update(operation.as_bytes());
    hasher.update([0u8]);
    hasher.update(resource.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(caller.as_bytes());
    TxHash::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_hash_depends_on_sequence() {
        let rid = ResourceId::new("r").unwrap();
        let caller = Address::from_bytes([7; 20]);

        let a = compute_tx_hash(1, "create_resource", &rid, &caller);
        let b = compute_tx_hash(1, "create_resource", &rid, &caller);
        let c = compute_tx_hash(2, "create_resource", &rid, &caller);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string().len(), 66);
    }
}
