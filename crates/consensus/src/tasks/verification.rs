//! Verification - tallies the attestations a new block carries for its predecessor

use async_trait::async_trait;
use sequencer_types::{Block, BranchSignature, Hash};
use std::collections::HashSet;
use std::sync::Arc;

use crate::events::{EventKind, NodeEvent};
use crate::node::{Node, NodeError};
use crate::tasks::Task;
use crate::validators::{meets_threshold, ValidatorSet};

pub struct VerificationTask {
    validators: Arc<ValidatorSet>,
}

impl VerificationTask {
    pub fn new(validators: Arc<ValidatorSet>) -> Self {
        Self { validators }
    }

    async fn verify_previous(&self, node: &Node, block: &Block) -> anyhow::Result<()> {
        let previous = node.block(block.height() - 1).await?;
        let mut approved = 0;

        for key in previous.branch_keys() {
            if let Some(status) = node.branch_status(&key).await? {
                if status.is_approved() || status.is_terminal() {
                    continue;
                }
            }

            let branch_hash = previous
                .branch_hash(key.element_type, key.branch_index)
                .ok_or(NodeError::MissingBranch(key))?;

            let carried = block
                .carried_signatures(key.element_type)
                .iter()
                .filter(|s| s.branch_index == key.branch_index);
            let votes = tally_votes(&self.validators, &branch_hash, carried);

            if meets_threshold(votes, self.validators.len()) {
                if node.approved(key).await? {
                    approved += 1;
                }
            } else {
                tracing::debug!(
                    "Branch {} has {} of {} votes",
                    key,
                    votes,
                    self.validators.len()
                );
            }
        }

        if approved > 0 {
            tracing::info!("Approved {} branches of slot {}", approved, previous.height());
        }
        Ok(())
    }
}

/// Distinct validators with a valid signature over `branch_hash`.
///
/// Unknown signers and signatures that fail verification are not counted.
pub(crate) fn tally_votes<'a>(
    validators: &ValidatorSet,
    branch_hash: &Hash,
    signatures: impl IntoIterator<Item = &'a BranchSignature>,
) -> usize {
    let mut voters = HashSet::new();

    for signature in signatures {
        if !validators.contains(&signature.account) || voters.contains(&signature.account) {
            continue;
        }
        if signature.verify(branch_hash) {
            voters.insert(signature.account);
        }
    }

    voters.len()
}

#[async_trait]
impl Task for VerificationTask {
    fn name(&self) -> &'static str {
        "verification"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::Proposed]
    }

    async fn on_event(&self, node: &Node, event: &NodeEvent) -> anyhow::Result<()> {
        let NodeEvent::Proposed(block) = event else {
            return Ok(());
        };
        if block.height() == 0 {
            return Ok(());
        }

        self.verify_previous(node, block).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::ValidatorIdentity;
    use ed25519_dalek::SigningKey;

    const HASH: Hash = [5u8; 32];

    fn vote(identity: &ValidatorIdentity) -> BranchSignature {
        BranchSignature::sign(0, identity.signing_key(), &HASH)
    }

    #[test]
    fn test_duplicate_signatures_count_once() {
        let set = ValidatorSet::dev(5).unwrap();
        let first = ValidatorIdentity::dev(0);
        let signatures = vec![vote(&first), vote(&first), vote(&first)];

        assert_eq!(tally_votes(&set, &HASH, &signatures), 1);
    }

    #[test]
    fn test_unknown_signers_are_ignored() {
        let set = ValidatorSet::dev(3).unwrap();
        let outsider = SigningKey::from_bytes(&[42u8; 32]);
        let signatures = vec![
            vote(&ValidatorIdentity::dev(0)),
            BranchSignature::sign(0, &outsider, &HASH),
        ];

        assert_eq!(tally_votes(&set, &HASH, &signatures), 1);
    }

    #[test]
    fn test_invalid_signatures_are_ignored() {
        let set = ValidatorSet::dev(3).unwrap();

        let mut forged = vote(&ValidatorIdentity::dev(1));
        forged.signature[0] ^= 0xff;
        let wrong_hash = BranchSignature::sign(0, ValidatorIdentity::dev(2).signing_key(), &[6u8; 32]);
        let truncated = BranchSignature {
            signature: vec![1, 2, 3],
            ..vote(&ValidatorIdentity::dev(0))
        };

        assert_eq!(tally_votes(&set, &HASH, &[forged, wrong_hash, truncated]), 0);
    }

    #[test]
    fn test_forged_copy_does_not_block_real_vote() {
        let set = ValidatorSet::dev(3).unwrap();
        let real = vote(&ValidatorIdentity::dev(1));
        let mut forged = real.clone();
        forged.signature[10] ^= 0x01;

        assert_eq!(tally_votes(&set, &HASH, &[forged, real]), 1);
    }

    #[test]
    fn test_threshold_over_tally() {
        let set = ValidatorSet::dev(5).unwrap();
        let signatures: Vec<_> = (1..5).map(|i| vote(&ValidatorIdentity::dev(i))).collect();

        let votes = tally_votes(&set, &HASH, &signatures);
        assert_eq!(votes, 4);
        assert!(meets_threshold(votes, set.len()));
        assert!(!meets_threshold(tally_votes(&set, &HASH, &signatures[..3]), set.len()));
    }
}
