//! Engine - the single serialized executor in front of the registry.
//!
//! All mutations run one at a time under the registry's write lock, so calls
//! are totally ordered: whichever call acquires the lock first observes the
//! pre-mutation state and the next one observes its result. Reads share the
//! read lock and never block each other.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::commit::{CommitSink, NullCommitSink};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::receipt::Receipt;
use crate::registry::ResourceRegistry;
use crate::snapshot::RegistrySnapshot;

/// Cloneable handle to a shared registry.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<RwLock<ResourceRegistry>>,
    sink: Arc<dyn CommitSink>,
}

impl Engine {
    /// Create an engine over an empty registry.
    pub fn new(config: EngineConfig) -> Self {
        Self::from_registry(ResourceRegistry::with_config(config))
    }

    /// Wrap an existing registry, e.g. one restored from a snapshot.
    pub fn from_registry(registry: ResourceRegistry) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            sink: Arc::new(NullCommitSink),
        }
    }

    /// Builder: hand committed receipts to `sink`.
    pub fn with_commit_sink(mut self, sink: Arc<dyn CommitSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run a mutating call. On success the receipt is handed to the commit
    /// sink before the lock is released, so the sink sees receipts in
    /// sequence order. A sink failure is logged; the registry stays
    /// authoritative.
    pub async fn submit<F>(&self, op: F) -> Result<Receipt>
    where
        F: FnOnce(&mut ResourceRegistry) -> Result<Receipt>,
    {
        let mut registry = self.registry.write().await;
        let receipt = op(&mut *registry)?;

        if let Err(e) = self.sink.commit(&receipt).await {
            warn!(
                sequence = receipt.sequence,
                resource = %receipt.resource,
                error = %e,
                "Commit sink failed to accept receipt"
            );
        }
        Ok(receipt)
    }

    /// Run a read-only query.
    pub async fn query<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&ResourceRegistry) -> T,
    {
        let registry = self.registry.read().await;
        f(&*registry)
    }

    /// Export the current state.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.query(|registry| registry.snapshot()).await
    }

    /// Sequence of the last committed call.
    pub async fn sequence(&self) -> u64 {
        self.query(|registry| registry.sequence()).await
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
