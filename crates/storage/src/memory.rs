//! In-memory storage using DashMap for concurrent access

use async_trait::async_trait;
use dashmap::DashMap;
use sequencer_types::{Block, BranchKey, BranchSignature, BranchStatus, ElementType, Slot};
use std::sync::Arc;

use crate::{Storage, StorageError};

/// Thread-safe in-memory storage
///
/// Used by tests and local runs; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    /// Blocks by height
    blocks: Arc<DashMap<Slot, Block>>,
    /// Current status of every branch
    statuses: Arc<DashMap<BranchKey, BranchStatus>>,
    /// Signatures per (height, element type), in arrival order
    signatures: Arc<DashMap<(Slot, ElementType), Vec<BranchSignature>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_block(&self, height: Slot) -> Result<Option<Block>, StorageError> {
        Ok(self.blocks.get(&height).map(|r| r.value().clone()))
    }

    async fn put_block(&self, block: &Block) -> Result<(), StorageError> {
        self.blocks.insert(block.height(), block.clone());
        Ok(())
    }

    async fn last_height(&self) -> Result<Option<Slot>, StorageError> {
        Ok(self.blocks.iter().map(|r| *r.key()).max())
    }

    async fn get_branch_status(
        &self,
        key: &BranchKey,
    ) -> Result<Option<BranchStatus>, StorageError> {
        Ok(self.statuses.get(key).map(|r| *r.value()))
    }

    async fn set_branch_status(
        &self,
        key: &BranchKey,
        status: BranchStatus,
    ) -> Result<(), StorageError> {
        self.statuses.insert(*key, status);
        Ok(())
    }

    async fn get_signatures(
        &self,
        height: Slot,
        element_type: ElementType,
    ) -> Result<Vec<BranchSignature>, StorageError> {
        Ok(self
            .signatures
            .get(&(height, element_type))
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn append_signature(
        &self,
        height: Slot,
        element_type: ElementType,
        signature: &BranchSignature,
    ) -> Result<(), StorageError> {
        self.signatures
            .entry((height, element_type))
            .or_default()
            .push(signature.clone());
        Ok(())
    }
}
