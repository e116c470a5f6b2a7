//! Sequencer Storage - persistence-facing accessors
//!
//! The sequencer addresses its tables through the narrow `Storage` trait:
//! - blocks keyed by slot height
//! - branch statuses keyed by (height, element type, branch index)
//! - validator signatures keyed by (height, element type)
//!
//! `MemoryStorage` keeps everything in memory, `SledStorage` persists to disk.

pub mod accessors;
pub mod error;
pub mod memory;
pub mod persistence;

pub use accessors::{BlockStorage, BranchStatusStorage, SignatureStorage};
pub use error::StorageError;
pub use memory::MemoryStorage;
pub use persistence::SledStorage;

use async_trait::async_trait;
use sequencer_types::{Block, BranchKey, BranchSignature, BranchStatus, ElementType, Slot};

/// Storage collaborator used by the sequencer core
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_block(&self, height: Slot) -> Result<Option<Block>, StorageError>;

    async fn put_block(&self, block: &Block) -> Result<(), StorageError>;

    /// Height of the highest stored block
    async fn last_height(&self) -> Result<Option<Slot>, StorageError>;

    async fn get_branch_status(&self, key: &BranchKey)
        -> Result<Option<BranchStatus>, StorageError>;

    async fn set_branch_status(
        &self,
        key: &BranchKey,
        status: BranchStatus,
    ) -> Result<(), StorageError>;

    /// Signatures recorded for branches of `element_type` at `height`, in insertion order
    async fn get_signatures(
        &self,
        height: Slot,
        element_type: ElementType,
    ) -> Result<Vec<BranchSignature>, StorageError>;

    async fn append_signature(
        &self,
        height: Slot,
        element_type: ElementType,
        signature: &BranchSignature,
    ) -> Result<(), StorageError>;
}
