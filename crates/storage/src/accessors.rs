//! Typed accessors over a shared `Storage`
//!
//! They hold no business logic; they only guard the shape of what is written.

use sequencer_types::{
    crypto::SIGNATURE_LEN, Block, BranchKey, BranchSignature, BranchStatus, ElementType, Slot,
};
use std::sync::Arc;

use crate::{Storage, StorageError};

/// Blocks keyed by slot height
#[derive(Clone)]
pub struct BlockStorage {
    storage: Arc<dyn Storage>,
}

impl BlockStorage {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, height: Slot) -> Result<Option<Block>, StorageError> {
        self.storage.get_block(height).await
    }

    /// Store a block. A stored block may only be replaced by one with the same header hash.
    pub async fn put(&self, block: &Block) -> Result<(), StorageError> {
        if let Some(existing) = self.storage.get_block(block.height()).await? {
            if existing.hash() != block.hash() {
                return Err(StorageError::Conflict {
                    height: block.height(),
                });
            }
        }
        self.storage.put_block(block).await
    }

    /// Highest stored block
    pub async fn last(&self) -> Result<Option<Block>, StorageError> {
        match self.storage.last_height().await? {
            Some(height) => self.storage.get_block(height).await,
            None => Ok(None),
        }
    }
}

/// Branch statuses keyed by (height, element type, branch index)
#[derive(Clone)]
pub struct BranchStatusStorage {
    storage: Arc<dyn Storage>,
}

impl BranchStatusStorage {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, key: &BranchKey) -> Result<Option<BranchStatus>, StorageError> {
        self.storage.get_branch_status(key).await
    }

    pub async fn set(&self, key: &BranchKey, status: BranchStatus) -> Result<(), StorageError> {
        self.storage.set_branch_status(key, status).await
    }
}

/// Validator signatures keyed by (height, element type)
#[derive(Clone)]
pub struct SignatureStorage {
    storage: Arc<dyn Storage>,
}

impl SignatureStorage {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(
        &self,
        height: Slot,
        element_type: ElementType,
    ) -> Result<Vec<BranchSignature>, StorageError> {
        self.storage.get_signatures(height, element_type).await
    }

    /// Signatures recorded for a single branch
    pub async fn get_for_branch(&self, key: &BranchKey) -> Result<Vec<BranchSignature>, StorageError> {
        let mut signatures = self.get(key.height, key.element_type).await?;
        signatures.retain(|s| s.branch_index == key.branch_index);
        Ok(signatures)
    }

    pub async fn append(
        &self,
        height: Slot,
        element_type: ElementType,
        signature: &BranchSignature,
    ) -> Result<(), StorageError> {
        if signature.signature.len() != SIGNATURE_LEN {
            return Err(StorageError::InvalidSignature(format!(
                "expected {} signature bytes, got {}",
                SIGNATURE_LEN,
                signature.signature.len()
            )));
        }
        self.storage
            .append_signature(height, element_type, signature)
            .await
    }
}
