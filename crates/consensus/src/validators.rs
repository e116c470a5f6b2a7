//! Validator identities and the approval threshold

use ed25519_dalek::SigningKey;
use rand::RngCore;
use sequencer_types::{
    crypto::{address_of, encode_address},
    Address, Slot,
};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Votes are scaled by this factor before comparing against the threshold
pub const APPROVAL_SCALE: u64 = 1_000;

/// Two thirds of `APPROVAL_SCALE`, rounded down (666)
pub const APPROVAL_THRESHOLD: u64 = 2 * APPROVAL_SCALE / 3;

/// Whether `votes` out of `validator_count` reach the two-thirds majority.
///
/// Integer arithmetic only: `floor(votes * 1000 / n) >= floor(2000 / 3)`.
pub fn meets_threshold(votes: usize, validator_count: usize) -> bool {
    if validator_count == 0 {
        return false;
    }
    (votes as u64).saturating_mul(APPROVAL_SCALE) / validator_count as u64 >= APPROVAL_THRESHOLD
}

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("validator set is empty")]
    Empty,

    #[error("duplicate validator {0}")]
    Duplicate(String),

    #[error("invalid validator seed: {0}")]
    InvalidSeed(String),
}

/// One signing identity
#[derive(Clone)]
pub struct ValidatorIdentity {
    signing_key: SigningKey,
    address: Address,
}

impl ValidatorIdentity {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let address = address_of(&signing_key);
        Self {
            signing_key,
            address,
        }
    }

    /// Parse a base58-encoded 32-byte seed
    pub fn from_bs58(seed: &str) -> Result<Self, ValidatorError> {
        let bytes = bs58::decode(seed)
            .into_vec()
            .map_err(|e| ValidatorError::InvalidSeed(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ValidatorError::InvalidSeed(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from_seed(&seed))
    }

    /// Deterministic identity for local networks and tests
    pub fn dev(index: usize) -> Self {
        let seed = blake3::hash(format!("dev-validator-{}", index).as_bytes());
        Self::from_seed(seed.as_bytes())
    }

    /// Fresh random identity; returns it with its base58 seed
    pub fn generate() -> (Self, String) {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        (Self::from_seed(&seed), bs58::encode(seed).into_string())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for ValidatorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorIdentity")
            .field("address", &encode_address(&self.address))
            .finish()
    }
}

/// Ordered validator identities, fixed for the lifetime of a run
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    identities: Vec<ValidatorIdentity>,
    addresses: HashSet<Address>,
}

impl ValidatorSet {
    pub fn new(identities: Vec<ValidatorIdentity>) -> Result<Self, ValidatorError> {
        if identities.is_empty() {
            return Err(ValidatorError::Empty);
        }

        let mut addresses = HashSet::with_capacity(identities.len());
        for identity in &identities {
            if !addresses.insert(identity.address()) {
                return Err(ValidatorError::Duplicate(encode_address(&identity.address())));
            }
        }

        Ok(Self {
            identities,
            addresses,
        })
    }

    /// `count` deterministic dev identities
    pub fn dev(count: usize) -> Result<Self, ValidatorError> {
        Self::new((0..count).map(ValidatorIdentity::dev).collect())
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Round-robin proposer index for a slot
    pub fn proposer_index(&self, slot: Slot) -> usize {
        (slot % self.identities.len() as u64) as usize
    }

    pub fn proposer(&self, slot: Slot) -> &ValidatorIdentity {
        &self.identities[self.proposer_index(slot)]
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatorIdentity> {
        self.identities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_arithmetic() {
        assert_eq!(APPROVAL_THRESHOLD, 666);

        // 5 validators: 800 passes, 600 does not
        assert!(meets_threshold(4, 5));
        assert!(!meets_threshold(3, 5));
        assert!(meets_threshold(5, 5));

        // 3 validators: 2 votes scale to exactly 666
        assert!(meets_threshold(2, 3));
        assert!(!meets_threshold(1, 3));

        assert!(meets_threshold(1, 1));
        assert!(!meets_threshold(0, 4));
        assert!(!meets_threshold(0, 0));
    }

    #[test]
    fn test_proposer_round_robin() {
        let set = ValidatorSet::dev(5).unwrap();

        assert_eq!(set.proposer_index(0), 0);
        assert_eq!(set.proposer_index(4), 4);
        assert_eq!(set.proposer_index(5), 0);
        assert_eq!(set.proposer_index(12), 2);
        assert_eq!(set.proposer(7).address(), ValidatorIdentity::dev(2).address());
    }

    #[test]
    fn test_set_rejects_empty_and_duplicates() {
        assert!(matches!(ValidatorSet::new(vec![]), Err(ValidatorError::Empty)));
        assert!(matches!(
            ValidatorSet::new(vec![ValidatorIdentity::dev(1), ValidatorIdentity::dev(1)]),
            Err(ValidatorError::Duplicate(_))
        ));
    }

    #[test]
    fn test_seed_round_trip() {
        let (identity, seed) = ValidatorIdentity::generate();
        let parsed = ValidatorIdentity::from_bs58(&seed).unwrap();
        assert_eq!(parsed.address(), identity.address());

        assert!(ValidatorIdentity::from_bs58("3mJr7AoUXx2Wqd").is_err());
        assert!(ValidatorIdentity::from_bs58("not base58 0OIl").is_err());
    }

    #[test]
    fn test_contains() {
        let set = ValidatorSet::dev(3).unwrap();
        assert!(set.contains(&ValidatorIdentity::dev(0).address()));
        assert!(!set.contains(&ValidatorIdentity::dev(3).address()));
        assert_eq!(set.len(), 3);
    }
}
