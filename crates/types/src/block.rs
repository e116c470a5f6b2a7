//! Block and block header for one slot

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{self, Address},
    BranchKey, BranchSignature, BurnPoint, ElementType, ExchangeRate, Hash, Purchase, Root, Slot,
    ZERO_HASH,
};

/// Header linking a slot to its predecessor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub prev_block_hash: Hash,
    pub height: Slot,
    /// Unix seconds at proposal time
    pub timestamp: u64,
    pub purchase_root_hash: Hash,
    pub exchange_rate_root_hash: Hash,
    pub burn_point_root_hash: Hash,
    /// Proposer's signature over `compute_hash()`; empty for genesis
    pub proposer_signature: Vec<u8>,
}

impl BlockHeader {
    /// Hash of every field except the proposer signature
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.prev_block_hash);
        hasher.update(&self.height.to_le_bytes());
        hasher.update(&self.timestamp.to_le_bytes());
        hasher.update(&self.purchase_root_hash);
        hasher.update(&self.exchange_rate_root_hash);
        hasher.update(&self.burn_point_root_hash);

        *hasher.finalize().as_bytes()
    }

    pub fn sign(&mut self, proposer: &SigningKey) {
        self.proposer_signature = crypto::sign_hash(proposer, &self.compute_hash());
    }

    pub fn verify_proposer(&self, proposer: &Address) -> bool {
        crypto::verify_hash(proposer, &self.compute_hash(), &self.proposer_signature)
    }
}

/// One slot's aggregate of purchases, exchange rates and burn points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub purchases: Root<Purchase>,
    pub exchange_rates: Root<ExchangeRate>,
    pub burn_points: Root<BurnPoint>,
}

impl Block {
    /// Assemble an unsigned block; root hashes are computed from the contents
    pub fn new(
        height: Slot,
        prev_block_hash: Hash,
        timestamp: u64,
        purchases: Root<Purchase>,
        exchange_rates: Root<ExchangeRate>,
        burn_points: Root<BurnPoint>,
    ) -> Self {
        let header = BlockHeader {
            prev_block_hash,
            height,
            timestamp,
            purchase_root_hash: purchases.compute_hash(height),
            exchange_rate_root_hash: exchange_rates.compute_hash(height),
            burn_point_root_hash: burn_points.compute_hash(height),
            proposer_signature: Vec::new(),
        };

        Self {
            header,
            purchases,
            exchange_rates,
            burn_points,
        }
    }

    /// Slot 0, empty and unsigned
    pub fn genesis(genesis_time: u64) -> Self {
        Self::new(0, ZERO_HASH, genesis_time, Root::new(), Root::new(), Root::new())
    }

    pub fn height(&self) -> Slot {
        self.header.height
    }

    pub fn hash(&self) -> Hash {
        self.header.compute_hash()
    }

    pub fn branch_count(&self, element_type: ElementType) -> usize {
        match element_type {
            ElementType::Purchase => self.purchases.branches.len(),
            ElementType::ExchangeRate => self.exchange_rates.branches.len(),
            ElementType::BurnPoint => self.burn_points.branches.len(),
        }
    }

    /// Keys of every branch in block order
    pub fn branch_keys(&self) -> Vec<BranchKey> {
        ElementType::ALL
            .iter()
            .flat_map(|&ty| {
                (0..self.branch_count(ty) as u32).map(move |i| BranchKey::new(self.height(), ty, i))
            })
            .collect()
    }

    /// Hash of one branch at this block's height
    pub fn branch_hash(&self, element_type: ElementType, branch_index: u32) -> Option<Hash> {
        let height = self.height();
        let index = branch_index as usize;
        match element_type {
            ElementType::Purchase => self.purchases.branch(index).map(|b| b.compute_hash(height)),
            ElementType::ExchangeRate => {
                self.exchange_rates.branch(index).map(|b| b.compute_hash(height))
            }
            ElementType::BurnPoint => self.burn_points.branch(index).map(|b| b.compute_hash(height)),
        }
    }

    /// Signatures this block carries for the previous slot
    pub fn carried_signatures(&self, element_type: ElementType) -> &[BranchSignature] {
        match element_type {
            ElementType::Purchase => &self.purchases.signatures,
            ElementType::ExchangeRate => &self.exchange_rates.signatures,
            ElementType::BurnPoint => &self.burn_points.signatures,
        }
    }

    /// Whether the stored root hashes match the contents
    pub fn roots_match(&self) -> bool {
        let height = self.height();
        self.header.purchase_root_hash == self.purchases.compute_hash(height)
            && self.header.exchange_rate_root_hash == self.exchange_rates.compute_hash(height)
            && self.header.burn_point_root_hash == self.burn_points.compute_hash(height)
    }
}
