//! Typed events and the synchronous event bus owned by `Node`
//!
//! `publish` awaits every subscriber in subscription order before it
//! returns, so a handler (and everything it publishes in turn) completes
//! before the mutation that raised the event returns to its caller.

use parking_lot::RwLock;
use sequencer_types::{Block, BranchKey, Slot};
use std::collections::HashMap;
use std::sync::Arc;

use crate::node::Node;
use crate::tasks::Task;

/// Event discriminant used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Proposed,
    ProofedBlock,
    Approved,
    Executed,
    Finalized,
    Canceled,
}

/// Events raised by `Node` mutations
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A block extended the chain head
    Proposed(Arc<Block>),
    /// Attestations for a block were recorded
    ProofedBlock { height: Slot, signatures: usize },
    Approved(BranchKey),
    Executed(BranchKey),
    Finalized(BranchKey),
    Canceled(BranchKey),
}

impl NodeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NodeEvent::Proposed(_) => EventKind::Proposed,
            NodeEvent::ProofedBlock { .. } => EventKind::ProofedBlock,
            NodeEvent::Approved(_) => EventKind::Approved,
            NodeEvent::Executed(_) => EventKind::Executed,
            NodeEvent::Finalized(_) => EventKind::Finalized,
            NodeEvent::Canceled(_) => EventKind::Canceled,
        }
    }
}

/// Publish/subscribe dispatcher
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Arc<dyn Task>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, task: Arc<dyn Task>) {
        self.subscribers.write().entry(kind).or_default().push(task);
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber in order; a failing handler is logged and skipped
    pub async fn publish(&self, node: &Node, event: NodeEvent) {
        let kind = event.kind();
        let subscribers = self.subscribers.read().get(&kind).cloned().unwrap_or_default();

        for task in subscribers {
            if let Err(e) = task.on_event(node, &event).await {
                tracing::error!("Task {} failed handling {:?}: {:#}", task.name(), kind, e);
            }
        }
    }
}
