//! Hand-off of committed receipts to an external durability layer.
//!
//! The engine is the authoritative state machine; a [`CommitSink`] receives
//! every committed receipt, in sequence order, so that an outside layer can
//! persist or replicate it.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::receipt::Receipt;

/// Error types for commit hand-off.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// Durability layer is not reachable
    #[error("Commit sink unavailable: {0}")]
    Unavailable(String),

    /// Durability layer refused the receipt
    #[error("Commit rejected: {0}")]
    Rejected(String),
}

/// Receives committed receipts.
#[async_trait]
pub trait CommitSink: Send + Sync {
    /// Accept one committed receipt.
    async fn commit(&self, receipt: &Receipt) -> Result<(), CommitError>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCommitSink;

#[async_trait]
impl CommitSink for NullCommitSink {
    async fn commit(&self, _receipt: &Receipt) -> Result<(), CommitError> {
        Ok(())
    }
}

/// Sink that keeps receipts in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryCommitSink {
    receipts: Arc<RwLock<Vec<Receipt>>>,
}

impl MemoryCommitSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receipts committed so far, in sequence order.
    pub async fn receipts(&self) -> Vec<Receipt> {
        self.receipts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.receipts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.receipts.read().await.is_empty()
    }
}

#[async_trait]
impl CommitSink for MemoryCommitSink {
    async fn commit(&self, receipt: &Receipt) -> Result<(), CommitError> {
        let mut receipts = self.receipts.write().await;
        receipts.push(receipt.clone());
        Ok(())
    }
}
