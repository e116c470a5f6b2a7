//! Attestation - every validator except the proposer signs each branch of a new block

use async_trait::async_trait;
use sequencer_types::{Block, BranchSignature, ElementType};
use std::sync::Arc;

use crate::events::{EventKind, NodeEvent};
use crate::node::Node;
use crate::tasks::Task;
use crate::validators::ValidatorSet;

pub struct AttestationTask {
    validators: Arc<ValidatorSet>,
}

impl AttestationTask {
    pub fn new(validators: Arc<ValidatorSet>) -> Self {
        Self { validators }
    }

    /// Signatures of every non-proposer validator over every branch of `block`
    pub fn attest(&self, block: &Block) -> Vec<(ElementType, BranchSignature)> {
        let proposer = self.validators.proposer_index(block.height());
        let mut signatures = Vec::new();

        for key in block.branch_keys() {
            let Some(branch_hash) = block.branch_hash(key.element_type, key.branch_index) else {
                continue;
            };

            for (index, validator) in self.validators.iter().enumerate() {
                if index == proposer {
                    continue;
                }
                signatures.push((
                    key.element_type,
                    BranchSignature::sign(key.branch_index, validator.signing_key(), &branch_hash),
                ));
            }
        }

        signatures
    }
}

#[async_trait]
impl Task for AttestationTask {
    fn name(&self) -> &'static str {
        "attestation"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::Proposed]
    }

    async fn on_event(&self, node: &Node, event: &NodeEvent) -> anyhow::Result<()> {
        let NodeEvent::Proposed(block) = event else {
            return Ok(());
        };

        let signatures = self.attest(block);
        if signatures.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            "Attesting slot {} with {} signatures",
            block.height(),
            signatures.len()
        );
        node.proofed_block(block.height(), signatures).await?;
        Ok(())
    }
}
