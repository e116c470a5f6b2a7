//! Node - dispatcher and owner of shared sequencing state
//!
//! The node holds the chain head, the block timing config, the ordered task
//! list and the event bus. Every status change goes through one of its
//! mutation entry points, which persist the transition and then publish the
//! matching event.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use sequencer_storage::{
    BlockStorage, BranchStatusStorage, SignatureStorage, Storage, StorageError,
};
use sequencer_types::{
    Block, BranchKey, BranchSignature, BranchStatus, ElementType, Hash, Slot,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

use crate::config::BlockConfig;
use crate::events::{EventBus, EventKind, NodeEvent};
use crate::tasks::Task;
use crate::validators::ValidatorSet;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("block {0} is missing from storage")]
    MissingBlock(Slot),

    #[error("branch {0} is missing from its block")]
    MissingBranch(BranchKey),
}

/// Work handed to the node from outside the tick, e.g. by a synchronization peer
#[derive(Debug, Clone)]
pub enum NodeCommand {
    /// Apply a block produced elsewhere
    ReplayBlock(Block),
    /// Record attestations produced elsewhere
    Attestations {
        height: Slot,
        signatures: Vec<(ElementType, BranchSignature)>,
    },
}

/// Handle for queueing commands into the node
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<NodeCommand>,
}

impl CommandSender {
    pub fn replay_block(&self, block: Block) -> Result<(), String> {
        self.send(NodeCommand::ReplayBlock(block))
    }

    pub fn submit_attestations(
        &self,
        height: Slot,
        signatures: Vec<(ElementType, BranchSignature)>,
    ) -> Result<(), String> {
        self.send(NodeCommand::Attestations { height, signatures })
    }

    pub fn send(&self, command: NodeCommand) -> Result<(), String> {
        self.sender
            .send(command)
            .map_err(|e| format!("Failed to queue node command: {}", e))
    }
}

/// Sequencing dispatcher
pub struct Node {
    blocks: BlockStorage,
    statuses: BranchStatusStorage,
    signatures: SignatureStorage,
    config: BlockConfig,
    /// Current chain head
    head: RwLock<Arc<Block>>,
    /// Tasks in registration order
    tasks: RwLock<Vec<Arc<dyn Task>>>,
    bus: EventBus,
    command_tx: Sender<NodeCommand>,
    command_rx: Receiver<NodeCommand>,
    /// Known validators; replayed blocks must carry the elected proposer's signature
    validators: Option<Arc<ValidatorSet>>,
}

impl Node {
    /// Open the node on top of `storage`, creating the genesis block on first start
    pub async fn open(storage: Arc<dyn Storage>, config: BlockConfig) -> Result<Self, NodeError> {
        let blocks = BlockStorage::new(storage.clone());
        let statuses = BranchStatusStorage::new(storage.clone());
        let signatures = SignatureStorage::new(storage);

        let head = match blocks.last().await? {
            Some(head) => {
                tracing::info!("Resuming from slot {}", head.height());
                head
            }
            None => {
                let genesis = Block::genesis(config.genesis_time);
                blocks.put(&genesis).await?;
                tracing::info!("Created genesis block at {}", config.genesis_time);
                genesis
            }
        };

        let (command_tx, command_rx) = unbounded();

        Ok(Self {
            blocks,
            statuses,
            signatures,
            config,
            head: RwLock::new(Arc::new(head)),
            tasks: RwLock::new(Vec::new()),
            bus: EventBus::new(),
            command_tx,
            command_rx,
            validators: None,
        })
    }

    /// Check replayed blocks against the proposer rotation of `validators`
    pub fn with_validators(mut self, validators: Arc<ValidatorSet>) -> Self {
        self.validators = Some(validators);
        self
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    pub fn head(&self) -> Arc<Block> {
        self.head.read().clone()
    }

    pub fn head_height(&self) -> Slot {
        self.head.read().height()
    }

    pub fn head_hash(&self) -> Hash {
        self.head.read().hash()
    }

    /// Append a task; it runs after every task registered before it
    pub fn register(&self, task: Arc<dyn Task>) {
        for kind in task.subscriptions() {
            self.bus.subscribe(*kind, task.clone());
        }
        tracing::debug!("Registered task {}", task.name());
        self.tasks.write().push(task);
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.bus.subscriber_count(kind)
    }

    pub fn command_sender(&self) -> CommandSender {
        CommandSender {
            sender: self.command_tx.clone(),
        }
    }

    /// One orchestration tick: drain queued commands, then run every task in order
    pub async fn work(&self) {
        self.drain_commands().await;

        let tasks = self.tasks.read().clone();
        for task in tasks {
            if let Err(e) = task.work(self).await {
                tracing::error!(
                    "Task {} failed at slot {}: {:#}",
                    task.name(),
                    self.head_height(),
                    e
                );
            }
        }
    }

    async fn drain_commands(&self) {
        loop {
            let command = match self.command_rx.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };

            let result = match command {
                NodeCommand::ReplayBlock(block) => {
                    let height = block.height();
                    if let Some(validators) = &self.validators {
                        let proposer = validators.proposer(height).address();
                        if !block.header.verify_proposer(&proposer) {
                            tracing::warn!(
                                "Dropping replayed block {}: not signed by its proposer",
                                height
                            );
                            continue;
                        }
                    }
                    self.proposed(block).await.map(|accepted| {
                        if !accepted {
                            tracing::debug!("Replayed block {} does not extend the head", height);
                        }
                    })
                }
                NodeCommand::Attestations { height, signatures } => {
                    self.proofed_block(height, signatures).await
                }
            };

            if let Err(e) = result {
                tracing::error!("Node command failed: {}", e);
            }
        }
    }

    /// Stored block at `height`, if any
    pub async fn find_block(&self, height: Slot) -> Result<Option<Block>, NodeError> {
        Ok(self.blocks.get(height).await?)
    }

    /// Stored block at `height`; a missing block is an error
    pub async fn block(&self, height: Slot) -> Result<Block, NodeError> {
        self.find_block(height)
            .await?
            .ok_or(NodeError::MissingBlock(height))
    }

    pub async fn branch_status(&self, key: &BranchKey) -> Result<Option<BranchStatus>, NodeError> {
        Ok(self.statuses.get(key).await?)
    }

    /// Signatures recorded for branches of one type at `height`
    pub async fn signatures(
        &self,
        height: Slot,
        element_type: ElementType,
    ) -> Result<Vec<BranchSignature>, NodeError> {
        Ok(self.signatures.get(height, element_type).await?)
    }

    /// Signatures recorded for one branch
    pub async fn branch_signatures(&self, key: &BranchKey) -> Result<Vec<BranchSignature>, NodeError> {
        Ok(self.signatures.get_for_branch(key).await?)
    }

    /// Persist `block` if it extends the head by exactly one slot.
    ///
    /// Returns `false` and leaves the head untouched otherwise.
    pub async fn proposed(&self, block: Block) -> Result<bool, NodeError> {
        let (head_height, head_hash) = {
            let head = self.head.read();
            (head.height(), head.hash())
        };

        if block.height() != head_height + 1 || block.header.prev_block_hash != head_hash {
            tracing::debug!(
                "Dropping block {}: head is at {} and the block does not extend it",
                block.height(),
                head_height
            );
            return Ok(false);
        }

        if !block.roots_match() {
            tracing::warn!("Dropping block {}: root hashes do not match contents", block.height());
            return Ok(false);
        }

        self.blocks.put(&block).await?;

        let block = Arc::new(block);
        *self.head.write() = block.clone();

        for key in block.branch_keys() {
            self.transition(key, BranchStatus::Proposed).await?;
        }

        self.bus.publish(self, NodeEvent::Proposed(block)).await;
        Ok(true)
    }

    /// Record attestations for the block at `height` and mark the touched branches proofed
    pub async fn proofed_block(
        &self,
        height: Slot,
        signatures: Vec<(ElementType, BranchSignature)>,
    ) -> Result<(), NodeError> {
        let block = self.block(height).await?;
        let mut touched = BTreeSet::new();
        let mut recorded = 0;

        for (element_type, signature) in &signatures {
            if signature.branch_index as usize >= block.branch_count(*element_type) {
                tracing::debug!(
                    "Ignoring signature for missing branch {}",
                    BranchKey::new(height, *element_type, signature.branch_index)
                );
                continue;
            }

            self.signatures.append(height, *element_type, signature).await?;
            touched.insert(BranchKey::new(height, *element_type, signature.branch_index));
            recorded += 1;
        }

        for key in touched {
            self.transition(key, BranchStatus::Proofed).await?;
        }

        self.bus
            .publish(
                self,
                NodeEvent::ProofedBlock {
                    height,
                    signatures: recorded,
                },
            )
            .await;
        Ok(())
    }

    pub async fn approved(&self, key: BranchKey) -> Result<bool, NodeError> {
        self.advance(key, BranchStatus::Approved, NodeEvent::Approved(key))
            .await
    }

    pub async fn executed(&self, key: BranchKey) -> Result<bool, NodeError> {
        self.advance(key, BranchStatus::Executed, NodeEvent::Executed(key))
            .await
    }

    pub async fn finalized(&self, key: BranchKey) -> Result<bool, NodeError> {
        self.advance(key, BranchStatus::Finalized, NodeEvent::Finalized(key))
            .await
    }

    pub async fn canceled(&self, key: BranchKey) -> Result<bool, NodeError> {
        self.advance(key, BranchStatus::Canceled, NodeEvent::Canceled(key))
            .await
    }

    async fn advance(
        &self,
        key: BranchKey,
        next: BranchStatus,
        event: NodeEvent,
    ) -> Result<bool, NodeError> {
        if !self.transition(key, next).await? {
            return Ok(false);
        }
        self.bus.publish(self, event).await;
        Ok(true)
    }

    /// Persist `next` if the state machine allows it
    async fn transition(&self, key: BranchKey, next: BranchStatus) -> Result<bool, NodeError> {
        let current = self.statuses.get(&key).await?;
        if !BranchStatus::can_transition(current, next) {
            tracing::debug!(
                "Refusing transition of branch {} from {:?} to {}",
                key,
                current,
                next
            );
            return Ok(false);
        }

        self.statuses.set(&key, next).await?;
        Ok(true)
    }
}
