//! Branch status state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ElementType, Slot};

/// Identifies one branch: (slot, record type, index in root)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchKey {
    pub height: Slot,
    pub element_type: ElementType,
    pub branch_index: u32,
}

impl BranchKey {
    pub fn new(height: Slot, element_type: ElementType, branch_index: u32) -> Self {
        Self {
            height,
            element_type,
            branch_index,
        }
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.height, self.element_type, self.branch_index)
    }
}

/// Lifecycle of a branch
///
/// ```text
/// Proposed -> Proofed -> Approved -> Executed -> Finalized
///     \__________\__________\_____________________> Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchStatus {
    Proposed,
    Proofed,
    Approved,
    Executed,
    Finalized,
    Canceled,
}

impl BranchStatus {
    /// Position in the lifecycle; both terminal states share the last rank
    pub fn rank(self) -> u8 {
        match self {
            BranchStatus::Proposed => 0,
            BranchStatus::Proofed => 1,
            BranchStatus::Approved => 2,
            BranchStatus::Executed => 3,
            BranchStatus::Finalized | BranchStatus::Canceled => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BranchStatus::Finalized | BranchStatus::Canceled)
    }

    /// Approved or any later state
    pub fn is_approved(self) -> bool {
        self.rank() >= BranchStatus::Approved.rank() && self != BranchStatus::Canceled
    }

    /// Whether a branch currently in `current` may move to `next`.
    /// Only `Executed` may be entered again.
    pub fn can_transition(current: Option<BranchStatus>, next: BranchStatus) -> bool {
        use BranchStatus::*;

        let Some(current) = current else {
            return next == Proposed;
        };

        match (current, next) {
            (Finalized | Canceled, _) => false,
            (Executed, Executed | Finalized) => true,
            (Executed, _) => false,
            (Approved, Executed) => true,
            (_, Executed | Finalized) => false,
            (_, Canceled) => true,
            (current, next) => next.rank() > current.rank(),
        }
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BranchStatus::Proposed => "PROPOSED",
            BranchStatus::Proofed => "PROOFED",
            BranchStatus::Approved => "APPROVED",
            BranchStatus::Executed => "EXECUTED",
            BranchStatus::Finalized => "FINALIZED",
            BranchStatus::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}
