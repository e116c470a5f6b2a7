//! Validator signatures over branch and header hashes

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::Hash;

/// Validator address: the 32-byte ed25519 verifying key
pub type Address = [u8; 32];

/// Length of an encoded ed25519 signature
pub const SIGNATURE_LEN: usize = 64;

/// A validator's attestation over one branch hash
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct BranchSignature {
    /// Index of the branch inside its root
    pub branch_index: u32,
    /// Signing validator
    pub account: Address,
    /// ed25519 signature over the branch hash
    pub signature: Vec<u8>,
}

impl BranchSignature {
    /// Sign `branch_hash` with `key`
    pub fn sign(branch_index: u32, key: &SigningKey, branch_hash: &Hash) -> Self {
        Self {
            branch_index,
            account: address_of(key),
            signature: sign_hash(key, branch_hash),
        }
    }

    /// Check the signature against the claimed account
    pub fn verify(&self, branch_hash: &Hash) -> bool {
        verify_hash(&self.account, branch_hash, &self.signature)
    }
}

/// Address of a signing key
pub fn address_of(key: &SigningKey) -> Address {
    key.verifying_key().to_bytes()
}

/// Sign a 32-byte digest
pub fn sign_hash(key: &SigningKey, hash: &Hash) -> Vec<u8> {
    key.sign(hash).to_bytes().to_vec()
}

/// Verify a signature over a 32-byte digest; malformed keys or signatures fail
pub fn verify_hash(account: &Address, hash: &Hash, signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(account) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(hash, &signature).is_ok()
}

/// Base58 rendering for logs and config
pub fn encode_address(address: &Address) -> String {
    bs58::encode(address).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn test_sign_and_verify() {
        let hash = *blake3::hash(b"branch").as_bytes();
        let sig = BranchSignature::sign(3, &key(1), &hash);

        assert_eq!(sig.branch_index, 3);
        assert_eq!(sig.signature.len(), SIGNATURE_LEN);
        assert!(sig.verify(&hash));
    }

    #[test]
    fn test_verify_rejects_wrong_signer_or_hash() {
        let hash = *blake3::hash(b"branch").as_bytes();
        let other_hash = *blake3::hash(b"other").as_bytes();
        let mut sig = BranchSignature::sign(0, &key(1), &hash);

        assert!(!sig.verify(&other_hash));

        sig.account = address_of(&key(2));
        assert!(!sig.verify(&hash));
    }

    #[test]
    fn test_malformed_signature() {
        let hash = [9u8; 32];
        assert!(!verify_hash(&address_of(&key(1)), &hash, &[0u8; 10]));
    }
}
