//! Finalization - resolves each cycle two cycles after it ends
//!
//! At every height `h` with `h % C == 0` the slots `h - 3C + 1 ..= h - 2C`
//! are resolved: executed branches are finalized and everything that is not
//! yet terminal is canceled. Purchases the queue failed to mark canceled are
//! retried on every tick.

use async_trait::async_trait;
use parking_lot::Mutex;
use sequencer_types::{BranchKey, BranchStatus, ElementType, Slot};
use settlement_bridge::PendingQueue;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::events::{EventKind, NodeEvent};
use crate::node::{Node, NodeError};
use crate::tasks::Task;

pub struct FinalizationTask {
    queue: Arc<dyn PendingQueue>,
    /// Canceled branches whose purchases the queue has not acknowledged
    unacknowledged: Mutex<Vec<(BranchKey, Vec<u64>)>>,
}

/// Slots resolved when the head reaches `height`, if any
pub fn finalization_window(height: Slot, cycle_length: u64) -> Option<RangeInclusive<Slot>> {
    if cycle_length == 0 || height % cycle_length != 0 {
        return None;
    }
    let end = height.checked_sub(2 * cycle_length).filter(|end| *end >= 1)?;
    let start = (end + 1).saturating_sub(cycle_length).max(1);
    Some(start..=end)
}

/// Highest slot already resolved when the head is at `head`, or 0
pub fn last_resolved_slot(head: Slot, cycle_length: u64) -> Slot {
    if cycle_length == 0 {
        return 0;
    }
    let boundary = head - head % cycle_length;
    boundary.saturating_sub(2 * cycle_length)
}

impl FinalizationTask {
    pub fn new(queue: Arc<dyn PendingQueue>) -> Self {
        Self {
            queue,
            unacknowledged: Mutex::new(Vec::new()),
        }
    }

    async fn cancel_purchases(&self, node: &Node, key: BranchKey) -> Result<(), NodeError> {
        let block = node.block(key.height).await?;
        let branch = block
            .purchases
            .branch(key.branch_index as usize)
            .ok_or(NodeError::MissingBranch(key))?;
        let ids: Vec<u64> = branch.items.iter().map(|p| p.id).collect();

        if let Err(e) = self.queue.mark_canceled(&ids).await {
            tracing::warn!("Failed to mark {} purchases of {} canceled: {}", ids.len(), key, e);
            self.unacknowledged.lock().push((key, ids));
        }
        Ok(())
    }
}

#[async_trait]
impl Task for FinalizationTask {
    fn name(&self) -> &'static str {
        "finalization"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::Proposed]
    }

    async fn on_event(&self, node: &Node, event: &NodeEvent) -> anyhow::Result<()> {
        let NodeEvent::Proposed(block) = event else {
            return Ok(());
        };
        let Some(window) = finalization_window(block.height(), node.config().cycle_length) else {
            return Ok(());
        };

        let (mut finalized, mut canceled) = (0usize, 0usize);
        for height in window.clone() {
            let resolved = node.block(height).await?;
            for key in resolved.branch_keys() {
                match node.branch_status(&key).await? {
                    Some(BranchStatus::Executed) => {
                        if node.finalized(key).await? {
                            finalized += 1;
                        }
                    }
                    Some(status) if status.is_terminal() => {}
                    _ => {
                        if node.canceled(key).await? {
                            canceled += 1;
                            if key.element_type == ElementType::Purchase {
                                self.cancel_purchases(node, key).await?;
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(
            "Resolved slots {}..={}: {} finalized, {} canceled",
            window.start(),
            window.end(),
            finalized,
            canceled
        );
        Ok(())
    }

    async fn work(&self, _node: &Node) -> anyhow::Result<()> {
        let pending = std::mem::take(&mut *self.unacknowledged.lock());
        if pending.is_empty() {
            return Ok(());
        }

        let mut still_pending = Vec::new();
        for (key, ids) in pending {
            match self.queue.mark_canceled(&ids).await {
                Ok(()) => tracing::info!("Marked {} purchases of {} canceled", ids.len(), key),
                Err(e) => {
                    tracing::debug!("Queue still refuses cancellation of {}: {}", key, e);
                    still_pending.push((key, ids));
                }
            }
        }
        self.unacknowledged.lock().extend(still_pending);
        Ok(())
    }
}
