//! Per-resource governance and audit-trail engine.
//!
//! Each independently addressed resource carries an owner, an admin set, an
//! active flag, a uniqueness flag and an append-only, versioned log of
//! content-hash changes. Admin changes and ownership transfers go through a
//! propose/approve workflow rather than unilateral action.
//!
//! # Key Components
//!
//! - [`ResourceRegistry`]: authoritative store and entry point for every call
//! - [`AdminRegistry`]: admin set and owner of one resource
//! - [`ProposalLedger`]: open governance proposals and their approvals
//! - [`HashLog`]: append-only change records of one resource
//! - [`Engine`]: serialized async executor with a [`CommitSink`] hand-off
//!
//! # Example
//!
//! ```
//! use provenance::{Address, ChangeType, DataHash, ResourceId, ResourceRegistry};
//!
//! let mut registry = ResourceRegistry::new();
//! let owner: Address = "0x1111111111111111111111111111111111111111".parse()?;
//! let id = ResourceId::new("test-item")?;
//!
//! registry.create_resource(owner, &id, false)?;
//! registry.register_change(owner, &id, DataHash::digest(b"first"), ChangeType::Create)?;
//!
//! assert_eq!(registry.get_version_count(&id)?, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod admin;
pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hashlog;
pub mod proposal;
pub mod receipt;
pub mod registry;
pub mod snapshot;
pub mod types;

// Re-export main types
pub use admin::AdminRegistry;
pub use commit::{CommitError, CommitSink, MemoryCommitSink, NullCommitSink};
pub use config::{
    ConfigError, EngineConfig, EventConfig, GeneralConfig, GovernanceConfig, LedgerConfig,
    UniquenessScope,
};
pub use engine::Engine;
pub use error::{ErrorKind, RegistryError, Result, Role, Violation};
pub use events::{Event, EventLog, EventRecord};
pub use hashlog::{ChangeRecord, HashLog};
pub use proposal::{ApprovalPolicy, Proposal, ProposalId, ProposalKind, ProposalLedger};
pub use receipt::Receipt;
pub use registry::{Resource, ResourceRegistry};
pub use snapshot::{RegistrySnapshot, ResourceSnapshot};
pub use types::{Address, ChangeType, DataHash, ParseError, ResourceId, TxHash};
