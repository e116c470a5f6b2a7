//! Proposal - builds and signs the block for the next due slot

use anyhow::Context;
use async_trait::async_trait;
use sequencer_types::{Block, BurnPoint, ElementType, ExchangeRate, Purchase, Root, Slot};
use settlement_bridge::PendingQueue;
use std::sync::Arc;

use crate::config::now_secs;
use crate::node::Node;
use crate::tasks::Task;
use crate::validators::ValidatorSet;

pub struct ProposalTask {
    validators: Arc<ValidatorSet>,
    queue: Arc<dyn PendingQueue>,
    /// Minimum age of a purchase before it is pulled
    wait_seconds: u64,
}

impl ProposalTask {
    pub fn new(validators: Arc<ValidatorSet>, queue: Arc<dyn PendingQueue>, wait_seconds: u64) -> Self {
        Self {
            validators,
            queue,
            wait_seconds,
        }
    }

    /// Assemble and sign the block for `height`. Pulled records are handed
    /// back to the queue if anything fails before the block exists.
    async fn build_block(&self, node: &Node, height: Slot, now: u64) -> anyhow::Result<Block> {
        let prev_height = height - 1;
        let mut purchases: Root<Purchase> = Root::new();
        let mut exchange_rates: Root<ExchangeRate> = Root::new();
        let mut burn_points: Root<BurnPoint> = Root::new();

        // Attestations for the previous slot travel with this block
        purchases.signatures = node.signatures(prev_height, ElementType::Purchase).await?;
        exchange_rates.signatures = node.signatures(prev_height, ElementType::ExchangeRate).await?;
        burn_points.signatures = node.signatures(prev_height, ElementType::BurnPoint).await?;

        let pending = self
            .queue
            .pull_pending_purchases(self.wait_seconds)
            .await
            .context("pulling pending purchases")?;
        let mut pulled = Pulled {
            purchase_ids: pending.iter().map(|p| p.id).collect(),
            ..Default::default()
        };

        match self.queue.pull_pending_rates().await {
            Ok(rates) => pulled.rates = rates,
            Err(e) => {
                self.restore(pulled).await;
                return Err(anyhow::Error::new(e).context("pulling pending rates"));
            }
        }
        match self.queue.pull_pending_burn_points().await {
            Ok(burns) => pulled.burn_points = burns,
            Err(e) => {
                self.restore(pulled).await;
                return Err(anyhow::Error::new(e).context("pulling pending burn points"));
            }
        }

        for purchase in pending {
            purchases.add_item(purchase);
        }
        for rate in pulled.rates {
            exchange_rates.add_item(rate);
        }
        for burn in pulled.burn_points {
            burn_points.add_item(burn);
        }

        let mut block = Block::new(
            height,
            node.head_hash(),
            now,
            purchases,
            exchange_rates,
            burn_points,
        );
        block
            .header
            .sign(self.validators.proposer(height).signing_key());

        Ok(block)
    }

    /// Hand records from a block that was never persisted back to the queue
    async fn restore(&self, pulled: Pulled) {
        let Pulled {
            purchase_ids,
            rates,
            burn_points,
        } = pulled;

        if !purchase_ids.is_empty() {
            if let Err(e) = self.queue.requeue(&purchase_ids).await {
                tracing::warn!("Failed to requeue {} purchases: {}", purchase_ids.len(), e);
            }
        }
        if !rates.is_empty() {
            let count = rates.len();
            if let Err(e) = self.queue.requeue_rates(rates).await {
                tracing::warn!("Failed to requeue {} rates: {}", count, e);
            }
        }
        if !burn_points.is_empty() {
            let count = burn_points.len();
            if let Err(e) = self.queue.requeue_burn_points(burn_points).await {
                tracing::warn!("Failed to requeue {} burn points: {}", count, e);
            }
        }
    }
}

/// Records taken from the queue for one block
#[derive(Default)]
struct Pulled {
    purchase_ids: Vec<u64>,
    rates: Vec<ExchangeRate>,
    burn_points: Vec<BurnPoint>,
}

impl Pulled {
    fn from_block(block: &Block) -> Self {
        Self {
            purchase_ids: block
                .purchases
                .branches
                .iter()
                .flat_map(|b| b.items.iter().map(|p| p.id))
                .collect(),
            rates: block
                .exchange_rates
                .branches
                .iter()
                .flat_map(|b| b.items.iter().cloned())
                .collect(),
            burn_points: block
                .burn_points
                .branches
                .iter()
                .flat_map(|b| b.items.iter().cloned())
                .collect(),
        }
    }
}

#[async_trait]
impl Task for ProposalTask {
    fn name(&self) -> &'static str {
        "proposal"
    }

    async fn work(&self, node: &Node) -> anyhow::Result<()> {
        let now = now_secs();
        let head_height = node.head_height();
        if head_height >= node.config().expected_slot(now) {
            return Ok(());
        }

        let height = head_height + 1;
        let block = self
            .build_block(node, height, now)
            .await
            .with_context(|| format!("building block {}", height))?;

        let pulled = Pulled::from_block(&block);
        let (purchase_count, rate_count, burn_count) = (
            block.purchases.item_count(),
            block.exchange_rates.item_count(),
            block.burn_points.item_count(),
        );

        match node.proposed(block).await {
            Ok(true) => {
                tracing::info!(
                    "Proposed slot {}: {} purchases, {} rates, {} burn points",
                    height,
                    purchase_count,
                    rate_count,
                    burn_count
                );
                Ok(())
            }
            Ok(false) => {
                tracing::debug!("Block {} was not accepted, head moved", height);
                self.restore(pulled).await;
                Ok(())
            }
            Err(e) => {
                self.restore(pulled).await;
                Err(anyhow::Error::new(e).context(format!("persisting block {}", height)))
            }
        }
    }
}
