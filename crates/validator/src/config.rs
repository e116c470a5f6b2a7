//! Sequencer Configuration

use anyhow::Context;
use sequencer_consensus::{
    BlockConfig, ValidatorIdentity, ValidatorSet, DEFAULT_CYCLE_LENGTH, DEFAULT_SLOT_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sequencer configuration, loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Directory holding the sled database
    pub data_dir: PathBuf,
    /// Unix seconds of slot 0
    pub genesis_time: u64,
    /// Seconds per slot
    pub slot_length_secs: u64,
    /// Slots per finalization cycle
    pub cycle_length: u64,
    /// Minimum age of a purchase before it is sequenced
    pub wait_seconds: u64,
    /// Base58 ed25519 seeds, in proposer order
    pub validator_seeds: Vec<String>,
    /// Number of deterministic dev validators used when no seeds are configured
    pub dev_validators: usize,
    pub log_level: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            genesis_time: 0,
            slot_length_secs: DEFAULT_SLOT_LENGTH,
            cycle_length: DEFAULT_CYCLE_LENGTH,
            wait_seconds: 60,
            validator_seeds: Vec::new(),
            dev_validators: 4,
            log_level: "info".to_string(),
        }
    }
}

impl SequencerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn block_config(&self) -> BlockConfig {
        BlockConfig::new(self.genesis_time, self.slot_length_secs, self.cycle_length)
    }

    /// Validators from the configured seeds, or dev identities if none are set
    pub fn validator_set(&self) -> anyhow::Result<ValidatorSet> {
        if self.validator_seeds.is_empty() {
            return Ok(ValidatorSet::dev(self.dev_validators)?);
        }

        let identities = self
            .validator_seeds
            .iter()
            .enumerate()
            .map(|(i, seed)| {
                ValidatorIdentity::from_bs58(seed).with_context(|| format!("validator seed #{}", i))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(ValidatorSet::new(identities)?)
    }
}
