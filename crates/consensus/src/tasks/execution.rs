//! Execution - settles approved branches with the external ledgers
//!
//! Approved branches are executed as soon as they are approved and retried on
//! every tick until finalization resolves their slot. A ledger failure leaves
//! the branch `Approved` for the next attempt.

use async_trait::async_trait;
use sequencer_types::{Block, BranchKey, BranchStatus, ElementType, Purchase, Slot};
use settlement_bridge::{PendingQueue, PurchaseLedger, RateLedger};
use std::ops::Range;
use std::sync::Arc;

use crate::events::{EventKind, NodeEvent};
use crate::node::{Node, NodeError};
use crate::tasks::finalization::last_resolved_slot;
use crate::tasks::Task;

pub struct ExecutionTask {
    queue: Arc<dyn PendingQueue>,
    purchase_ledger: Arc<PurchaseLedger>,
    rate_ledger: Arc<RateLedger>,
}

impl ExecutionTask {
    pub fn new(
        queue: Arc<dyn PendingQueue>,
        purchase_ledger: Arc<PurchaseLedger>,
        rate_ledger: Arc<RateLedger>,
    ) -> Self {
        Self {
            queue,
            purchase_ledger,
            rate_ledger,
        }
    }

    async fn execute(&self, node: &Node, key: BranchKey) -> anyhow::Result<()> {
        if node.branch_status(&key).await? != Some(BranchStatus::Approved) {
            return Ok(());
        }

        let block = node.block(key.height).await?;
        let settled = match key.element_type {
            ElementType::Purchase => self.settle_purchases(node, &block, key).await?,
            ElementType::ExchangeRate => self.settle_rates(node, &block, key).await?,
            // Burn points have no settlement service
            ElementType::BurnPoint => true,
        };

        if settled && node.executed(key).await? {
            tracing::info!("Executed branch {}", key);
        }
        Ok(())
    }

    /// Returns `true` once every purchase of the branch is settled on the ledger
    /// and marked settled in the queue
    async fn settle_purchases(
        &self,
        node: &Node,
        block: &Block,
        key: BranchKey,
    ) -> Result<bool, NodeError> {
        let branch = block
            .purchases
            .branch(key.branch_index as usize)
            .ok_or(NodeError::MissingBranch(key))?;
        let ids: Vec<u64> = branch.items.iter().map(|p| p.id).collect();

        let mut unsettled: Vec<Purchase> = Vec::with_capacity(branch.items.len());
        for purchase in &branch.items {
            match self.purchase_ledger.already_settled(purchase.id).await {
                Ok(true) => {}
                Ok(false) => unsettled.push(purchase.clone()),
                Err(e) => {
                    tracing::warn!("Settlement lookup for branch {} failed: {}", key, e);
                    return Ok(false);
                }
            }
        }

        if !unsettled.is_empty() {
            let signatures = node.branch_signatures(&key).await?;
            let tx = match self
                .purchase_ledger
                .submit(key, &unsettled, &signatures)
                .await
            {
                Ok(tx) => tx,
                Err(e) => {
                    tracing::warn!("Purchase settlement for branch {} failed: {}", key, e);
                    return Ok(false);
                }
            };

            match self.purchase_ledger.wait(&tx).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!("Purchase settlement {} for branch {} reverted", tx.0, key);
                    return Ok(false);
                }
                Err(e) => {
                    tracing::warn!("Waiting on settlement {} for branch {} failed: {}", tx.0, key, e);
                    return Ok(false);
                }
            }
        } else {
            tracing::debug!("Branch {} was already settled", key);
        }

        if let Err(e) = self.queue.mark_settled(&ids).await {
            tracing::warn!("Failed to mark {} purchases settled: {}", ids.len(), e);
            return Ok(false);
        }
        Ok(true)
    }

    /// Rates are only worth settling while they are the latest executed slot;
    /// older branches are passed through
    async fn settle_rates(&self, node: &Node, block: &Block, key: BranchKey) -> Result<bool, NodeError> {
        if key.height + 1 != node.head_height() {
            tracing::debug!("Passing rate branch {} through, head has moved on", key);
            return Ok(true);
        }

        match self.rate_ledger.branch_settled(key).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Rate lookup for branch {} failed: {}", key, e);
                return Ok(false);
            }
        }

        let branch = block
            .exchange_rates
            .branch(key.branch_index as usize)
            .ok_or(NodeError::MissingBranch(key))?;
        let signatures = node.branch_signatures(&key).await?;

        let tx = match self
            .rate_ledger
            .submit(key, &branch.items, &signatures)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!("Rate settlement for branch {} failed: {}", key, e);
                return Ok(false);
            }
        };

        match self.rate_ledger.wait(&tx).await {
            Ok(settled) => {
                if !settled {
                    tracing::warn!("Rate settlement {} for branch {} reverted", tx.0, key);
                }
                Ok(settled)
            }
            Err(e) => {
                tracing::warn!("Waiting on rate settlement {} failed: {}", tx.0, e);
                Ok(false)
            }
        }
    }
}

/// Slots below `head` that finalization has not resolved yet
pub fn retry_window(head: Slot, cycle_length: u64) -> Range<Slot> {
    (last_resolved_slot(head, cycle_length) + 1)..head
}

#[async_trait]
impl Task for ExecutionTask {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::Approved]
    }

    async fn on_event(&self, node: &Node, event: &NodeEvent) -> anyhow::Result<()> {
        if let NodeEvent::Approved(key) = event {
            self.execute(node, *key).await?;
        }
        Ok(())
    }

    async fn work(&self, node: &Node) -> anyhow::Result<()> {
        for height in retry_window(node.head_height(), node.config().cycle_length) {
            let Some(block) = node.find_block(height).await? else {
                continue;
            };
            for key in block.branch_keys() {
                if node.branch_status(&key).await? == Some(BranchStatus::Approved) {
                    self.execute(node, key).await?;
                }
            }
        }
        Ok(())
    }
}
