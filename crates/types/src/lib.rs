//! Sequencer Types - Slot and block data model
//!
//! Records are grouped per slot into capacity-bounded branches:
//! - `Branch` holds at most 64 records of one type and hashes independently
//! - `Root` aggregates the branches of one record type for a slot
//! - `Block` links the three roots of a slot to the previous block
//! - `BranchStatus` tracks each branch through voting and settlement

pub mod block;
pub mod branch;
pub mod crypto;
pub mod record;
pub mod status;

pub use block::{Block, BlockHeader};
pub use branch::{Branch, Root, BRANCH_CAPACITY};
pub use crypto::{Address, BranchSignature};
pub use record::{BranchItem, BurnPoint, ElementType, ExchangeRate, Purchase};
pub use status::{BranchKey, BranchStatus};

/// 32-byte blake3 digest
pub type Hash = [u8; 32];

/// Hash of an empty branch or root
pub const ZERO_HASH: Hash = [0u8; 32];

/// Slot number (block height)
pub type Slot = u64;
