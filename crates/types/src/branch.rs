//! Capacity-bounded branches and the per-type root that holds them
//!
//! Branch and root hashes use the same aggregation:
//! `blake3(height ‖ count ‖ child_hash*)`, with the zero hash for no children.

use serde::{Deserialize, Serialize};

use crate::{BranchItem, BranchSignature, Hash, ZERO_HASH};

/// Maximum records per branch
pub const BRANCH_CAPACITY: usize = 64;

fn aggregate_hash<I>(height: u64, hashes: I) -> Hash
where
    I: ExactSizeIterator<Item = Hash>,
{
    if hashes.len() == 0 {
        return ZERO_HASH;
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(&height.to_le_bytes());
    hasher.update(&(hashes.len() as u64).to_le_bytes());
    for hash in hashes {
        hasher.update(&hash);
    }

    *hasher.finalize().as_bytes()
}

/// Ordered records of one type, at most `BRANCH_CAPACITY` long
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch<T> {
    pub items: Vec<T>,
}

impl<T: BranchItem> Branch<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(BRANCH_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= BRANCH_CAPACITY
    }

    /// Hash of the branch as included at `height`
    pub fn compute_hash(&self, height: u64) -> Hash {
        aggregate_hash(height, self.items.iter().map(BranchItem::item_hash))
    }
}

impl<T: BranchItem> Default for Branch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// All branches of one record type in a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root<T> {
    pub branches: Vec<Branch<T>>,
    /// Attestations for the previous slot's branches of this type
    pub signatures: Vec<BranchSignature>,
}

impl<T: BranchItem> Root<T> {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// Append to the first branch with room, opening a new branch only when all are full.
    /// Returns the index of the branch that received the item.
    pub fn add_item(&mut self, item: T) -> usize {
        let index = match self.branches.iter().position(|b| !b.is_full()) {
            Some(index) => index,
            None => {
                self.branches.push(Branch::new());
                self.branches.len() - 1
            }
        };

        self.branches[index].items.push(item);
        index
    }

    pub fn branch(&self, index: usize) -> Option<&Branch<T>> {
        self.branches.get(index)
    }

    /// Total number of records across branches
    pub fn item_count(&self) -> usize {
        self.branches.iter().map(Branch::len).sum()
    }

    /// Carried signatures addressed to one branch index
    pub fn signatures_for(&self, branch_index: u32) -> impl Iterator<Item = &BranchSignature> {
        self.signatures
            .iter()
            .filter(move |s| s.branch_index == branch_index)
    }

    /// Two-level hash: branch hashes aggregated like item hashes
    pub fn compute_hash(&self, height: u64) -> Hash {
        aggregate_hash(height, self.branches.iter().map(|b| b.compute_hash(height)))
    }
}

impl<T: BranchItem> Default for Root<T> {
    fn default() -> Self {
        Self::new()
    }
}
