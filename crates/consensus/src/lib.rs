//! Sequencer Consensus - Slot pipeline driven by a single node
//!
//! Architecture:
//! - `Node` owns the chain head, the storage accessors and the event bus
//! - Each tick runs Proposal, Attestation, Verification, Execution and
//!   Finalization in that order
//! - Branches are approved once two thirds of the validators attest them,
//!   settled with the external ledgers, and finalized two cycles later

pub mod config;
pub mod events;
pub mod node;
pub mod tasks;
pub mod validators;

#[cfg(test)]
mod tests;

pub use config::{now_secs, BlockConfig, DEFAULT_CYCLE_LENGTH, DEFAULT_SLOT_LENGTH};
pub use events::{EventBus, EventKind, NodeEvent};
pub use node::{CommandSender, Node, NodeCommand, NodeError};
pub use tasks::{
    AttestationTask, ExecutionTask, FinalizationTask, PipelineBuilder, ProposalTask, Task,
    VerificationTask,
};
pub use validators::{meets_threshold, ValidatorError, ValidatorIdentity, ValidatorSet};
