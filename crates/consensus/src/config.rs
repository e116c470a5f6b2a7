//! Slot timing configuration

use sequencer_types::Slot;

/// Default slot length in seconds
pub const DEFAULT_SLOT_LENGTH: u64 = 10;

/// Slots per finalization cycle
pub const DEFAULT_CYCLE_LENGTH: u64 = 3;

/// Timing shared by every task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockConfig {
    /// Unix seconds of slot 0
    pub genesis_time: u64,
    /// Seconds per slot
    pub slot_length: u64,
    /// Slots per finalization cycle
    pub cycle_length: u64,
}

impl BlockConfig {
    pub fn new(genesis_time: u64, slot_length: u64, cycle_length: u64) -> Self {
        Self {
            genesis_time,
            slot_length,
            cycle_length,
        }
    }

    /// Slot that should be the chain head at `now`
    pub fn expected_slot(&self, now: u64) -> Slot {
        if self.slot_length == 0 {
            return 0;
        }
        now.saturating_sub(self.genesis_time) / self.slot_length
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            genesis_time: 0,
            slot_length: DEFAULT_SLOT_LENGTH,
            cycle_length: DEFAULT_CYCLE_LENGTH,
        }
    }
}

/// Current unix time in seconds
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
