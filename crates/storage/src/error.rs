//! Storage errors

use sequencer_types::Slot;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("block {height} is already stored with a different hash")]
    Conflict { height: Slot },

    #[error("invalid signature record: {0}")]
    InvalidSignature(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}
