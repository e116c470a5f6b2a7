//! Slot Sequencer
//!
//! Main entry point for the slot sequencer node.
//! Batches pending purchases, exchange rates and burn points into one block
//! per slot, collects validator attestations and settles approved branches.
//! Blocks and statuses are persisted to disk and survive restarts.

use anyhow::Result;
use clap::Parser;
use sequencer_consensus::{now_secs, Node, PipelineBuilder, ValidatorIdentity};
use sequencer_storage::{SledStorage, Storage};
use sequencer_types::crypto::encode_address;
use settlement_bridge::{MemoryLedger, MemoryPendingQueue, PurchaseLedger, RateLedger};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::SequencerConfig;

/// Slot Sequencer Node
#[derive(Parser, Debug)]
#[command(name = "slot-sequencer")]
#[command(about = "Slot-based sequencer with threshold attestation and settlement", long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Unix seconds of slot 0 (0 = now, on first start)
    #[arg(long)]
    genesis_time: Option<u64>,

    /// Slot length in seconds
    #[arg(long)]
    slot_length: Option<u64>,

    /// Slots per finalization cycle
    #[arg(long)]
    cycle_length: Option<u64>,

    /// Minimum purchase age in seconds before it is sequenced
    #[arg(long)]
    wait_seconds: Option<u64>,

    /// Number of dev validators when no seeds are configured
    #[arg(long)]
    dev_validators: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Print a fresh validator seed and exit
    #[arg(long)]
    generate_key: bool,
}

impl Args {
    fn apply(&self, config: &mut SequencerConfig) {
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(genesis_time) = self.genesis_time {
            config.genesis_time = genesis_time;
        }
        if let Some(slot_length) = self.slot_length {
            config.slot_length_secs = slot_length;
        }
        if let Some(cycle_length) = self.cycle_length {
            config.cycle_length = cycle_length;
        }
        if let Some(wait_seconds) = self.wait_seconds {
            config.wait_seconds = wait_seconds;
        }
        if let Some(dev_validators) = self.dev_validators {
            config.dev_validators = dev_validators;
        }
        if let Some(log_level) = &self.log_level {
            config.log_level = log_level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.generate_key {
        let (identity, seed) = ValidatorIdentity::generate();
        println!("address: {}", encode_address(&identity.address()));
        println!("seed:    {}", seed);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => SequencerConfig::load(path)?,
        None => SequencerConfig::default(),
    };
    args.apply(&mut config);

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(config).await
}

async fn run(mut config: SequencerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;
    let storage = Arc::new(SledStorage::open(&config.data_dir)?);

    // The stored genesis block pins slot timing across restarts
    match storage.get_block(0).await? {
        Some(genesis) => {
            if config.genesis_time != 0 && config.genesis_time != genesis.header.timestamp {
                tracing::warn!(
                    "Ignoring genesis_time {}, the chain in {:?} started at {}",
                    config.genesis_time,
                    config.data_dir,
                    genesis.header.timestamp
                );
            }
            config.genesis_time = genesis.header.timestamp;
        }
        None if config.genesis_time == 0 => config.genesis_time = now_secs(),
        None => {}
    }

    let validators = Arc::new(config.validator_set()?);

    tracing::info!("Starting slot sequencer");
    tracing::info!("  Data directory: {:?}", config.data_dir);
    tracing::info!("  Genesis time: {}", config.genesis_time);
    tracing::info!("  Slot length: {}s", config.slot_length_secs);
    tracing::info!("  Cycle length: {} slots", config.cycle_length);
    tracing::info!("  Validators: {}", validators.len());
    for (i, validator) in validators.iter().enumerate() {
        tracing::debug!("    #{} {}", i, encode_address(&validator.address()));
    }

    let node = Node::open(storage.clone(), config.block_config())
        .await?
        .with_validators(validators.clone());

    let queue = Arc::new(MemoryPendingQueue::new());
    let purchase_ledger: Arc<PurchaseLedger> = Arc::new(MemoryLedger::purchases());
    let rate_ledger: Arc<RateLedger> = Arc::new(MemoryLedger::rates());

    PipelineBuilder::new(validators, queue, purchase_ledger, rate_ledger)
        .wait_seconds(config.wait_seconds)
        .register(&node);

    let mut trigger = tokio::time::interval(Duration::from_secs(config.slot_length_secs.max(1)));
    trigger.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Sequencer running at slot {}. Press Ctrl+C to stop.", node.head_height());

    loop {
        tokio::select! {
            _ = trigger.tick() => {
                node.work().await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    if let Err(e) = storage.flush() {
        tracing::error!("Failed to flush storage: {}", e);
    } else {
        tracing::info!("Storage flushed at slot {} ({} blocks)", node.head_height(), storage.block_count());
    }

    tracing::info!("Sequencer stopped");

    Ok(())
}
