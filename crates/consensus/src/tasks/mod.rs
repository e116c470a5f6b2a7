//! Pipeline tasks
//!
//! Each task reacts to the events it subscribes to and may also run one step
//! of its own logic on every tick. Registration order is execution order.

pub mod attestation;
pub mod execution;
pub mod finalization;
pub mod proposal;
pub mod verification;

pub use attestation::AttestationTask;
pub use execution::ExecutionTask;
pub use finalization::FinalizationTask;
pub use proposal::ProposalTask;
pub use verification::VerificationTask;

use async_trait::async_trait;
use settlement_bridge::{PendingQueue, PurchaseLedger, RateLedger};
use std::sync::Arc;

use crate::events::{EventKind, NodeEvent};
use crate::node::Node;
use crate::validators::ValidatorSet;

/// A unit of pipeline work driven by `Node`
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    /// Event kinds delivered to `on_event`
    fn subscriptions(&self) -> &'static [EventKind] {
        &[]
    }

    async fn on_event(&self, _node: &Node, _event: &NodeEvent) -> anyhow::Result<()> {
        Ok(())
    }

    /// One step per tick
    async fn work(&self, _node: &Node) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Wires the five pipeline tasks into a node in their fixed order
pub struct PipelineBuilder {
    validators: Arc<ValidatorSet>,
    queue: Arc<dyn PendingQueue>,
    purchase_ledger: Arc<PurchaseLedger>,
    rate_ledger: Arc<RateLedger>,
    wait_seconds: u64,
}

impl PipelineBuilder {
    pub fn new(
        validators: Arc<ValidatorSet>,
        queue: Arc<dyn PendingQueue>,
        purchase_ledger: Arc<PurchaseLedger>,
        rate_ledger: Arc<RateLedger>,
    ) -> Self {
        Self {
            validators,
            queue,
            purchase_ledger,
            rate_ledger,
            wait_seconds: 0,
        }
    }

    /// Minimum age of a purchase before it is sequenced
    pub fn wait_seconds(mut self, seconds: u64) -> Self {
        self.wait_seconds = seconds;
        self
    }

    /// Register Proposal, Attestation, Verification, Execution and Finalization
    pub fn register(self, node: &Node) {
        node.register(Arc::new(ProposalTask::new(
            self.validators.clone(),
            self.queue.clone(),
            self.wait_seconds,
        )));
        node.register(Arc::new(AttestationTask::new(self.validators.clone())));
        node.register(Arc::new(VerificationTask::new(self.validators)));
        node.register(Arc::new(ExecutionTask::new(
            self.queue.clone(),
            self.purchase_ledger,
            self.rate_ledger,
        )));
        node.register(Arc::new(FinalizationTask::new(self.queue)));
    }
}
