//! Persistence Layer for sequencer state
//!
//! Uses the sled embedded database. Values are bincode-encoded; keys start
//! with the big-endian height so prefix scans and `last()` follow slot order.

use async_trait::async_trait;
use sequencer_types::{Block, BranchKey, BranchSignature, BranchStatus, ElementType, Slot};
use sled::Db;
use std::path::Path;

use crate::{Storage, StorageError};

fn height_key(height: Slot) -> [u8; 8] {
    height.to_be_bytes()
}

fn type_prefix(height: Slot, element_type: ElementType) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 1 + 8);
    key.extend_from_slice(&height.to_be_bytes());
    key.push(element_type.tag());
    key
}

fn status_key(key: &BranchKey) -> Vec<u8> {
    let mut out = type_prefix(key.height, key.element_type);
    out.extend_from_slice(&key.branch_index.to_be_bytes());
    out
}

/// Persistent storage backed by sled
pub struct SledStorage {
    /// Sled database instance
    db: Db,
    /// Blocks by height
    blocks: sled::Tree,
    /// Branch statuses
    branch_status: sled::Tree,
    /// Signatures, keyed by (height, type, sequence id)
    signatures: sled::Tree,
}

impl SledStorage {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(&path)?;
        let blocks = db.open_tree("blocks")?;
        let branch_status = db.open_tree("branch_status")?;
        let signatures = db.open_tree("signatures")?;

        tracing::info!("Opened sequencer store at {:?}", path.as_ref());

        Ok(Self {
            db,
            blocks,
            branch_status,
            signatures,
        })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[async_trait]
impl Storage for SledStorage {
    async fn get_block(&self, height: Slot) -> Result<Option<Block>, StorageError> {
        match self.blocks.get(height_key(height))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put_block(&self, block: &Block) -> Result<(), StorageError> {
        let bytes = bincode::serialize(block)?;
        self.blocks.insert(height_key(block.height()), bytes)?;
        Ok(())
    }

    async fn last_height(&self) -> Result<Option<Slot>, StorageError> {
        match self.blocks.last()? {
            Some((key, _)) => {
                let arr: [u8; 8] = key
                    .as_ref()
                    .try_into()
                    .map_err(|_| StorageError::Corrupt("block key is not 8 bytes".to_string()))?;
                Ok(Some(Slot::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    async fn get_branch_status(
        &self,
        key: &BranchKey,
    ) -> Result<Option<BranchStatus>, StorageError> {
        match self.branch_status.get(status_key(key))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set_branch_status(
        &self,
        key: &BranchKey,
        status: BranchStatus,
    ) -> Result<(), StorageError> {
        let bytes = bincode::serialize(&status)?;
        self.branch_status.insert(status_key(key), bytes)?;
        Ok(())
    }

    async fn get_signatures(
        &self,
        height: Slot,
        element_type: ElementType,
    ) -> Result<Vec<BranchSignature>, StorageError> {
        let mut signatures = Vec::new();
        for result in self.signatures.scan_prefix(type_prefix(height, element_type)) {
            let (_, value) = result?;
            signatures.push(bincode::deserialize(&value)?);
        }
        Ok(signatures)
    }

    async fn append_signature(
        &self,
        height: Slot,
        element_type: ElementType,
        signature: &BranchSignature,
    ) -> Result<(), StorageError> {
        let mut key = type_prefix(height, element_type);
        key.extend_from_slice(&self.db.generate_id()?.to_be_bytes());

        let bytes = bincode::serialize(signature)?;
        self.signatures.insert(key, bytes)?;
        Ok(())
    }
}
