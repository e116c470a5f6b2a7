//! Off-chain records carried in branches

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Hash;

/// Record type of a root, also part of every branch key
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
pub enum ElementType {
    Purchase,
    ExchangeRate,
    BurnPoint,
}

impl ElementType {
    /// All element types in block order
    pub const ALL: [ElementType; 3] = [
        ElementType::Purchase,
        ElementType::ExchangeRate,
        ElementType::BurnPoint,
    ];

    /// Stable one-byte tag used in storage keys
    pub fn tag(self) -> u8 {
        match self {
            ElementType::Purchase => 0,
            ElementType::ExchangeRate => 1,
            ElementType::BurnPoint => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ElementType::Purchase),
            1 => Some(ElementType::ExchangeRate),
            2 => Some(ElementType::BurnPoint),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Purchase => "PURCHASE",
            ElementType::ExchangeRate => "EXCHANGE_RATE",
            ElementType::BurnPoint => "BURN_POINT",
        };
        f.write_str(name)
    }
}

/// A record that can be placed in a branch
pub trait BranchItem: BorshSerialize + Clone + Send + Sync + 'static {
    /// Root this record type belongs to
    const ELEMENT_TYPE: ElementType;

    /// Hash of the record's Borsh encoding
    fn item_hash(&self) -> Hash {
        let bytes = borsh::to_vec(self).expect("record serialization should not fail");
        *blake3::hash(&bytes).as_bytes()
    }
}

/// A purchase made off-chain, waiting for settlement
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Purchase {
    /// Pending-queue id, used to mark the record settled or canceled
    pub id: u64,
    /// Merchant-side purchase identifier
    pub purchase_id: String,
    /// Purchase time (unix seconds)
    pub timestamp: u64,
    /// Wallet credited by the purchase
    pub wallet: String,
    /// Total purchase amount in minor units
    pub total_amount: u128,
    /// Part of the total paid in cash
    pub cash_amount: u128,
    /// ISO currency code
    pub currency: String,
    pub shop_id: String,
}

impl BranchItem for Purchase {
    const ELEMENT_TYPE: ElementType = ElementType::Purchase;
}

/// Exchange rate of a currency against the point token
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct ExchangeRate {
    pub symbol: String,
    /// Fixed-point rate (18 decimals)
    pub rate: u128,
    pub timestamp: u64,
}

impl BranchItem for ExchangeRate {
    const ELEMENT_TYPE: ElementType = ElementType::ExchangeRate;
}

/// Points burned by an account
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BurnPoint {
    pub id: u64,
    pub account: String,
    pub amount: u128,
    pub timestamp: u64,
}

impl BranchItem for BurnPoint {
    const ELEMENT_TYPE: ElementType = ElementType::BurnPoint;
}
