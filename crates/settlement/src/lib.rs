//! Settlement Bridge - collaborators outside the sequencing core
//!
//! - `PendingQueue`: off-chain records waiting to be sequenced
//! - `Ledger`: the external purchase and rate settlement services
//!
//! In-memory implementations back local runs and tests.

pub mod error;
pub mod ledger;
pub mod queue;

pub use error::{LedgerError, QueueError};
pub use ledger::{FailureMode, Ledger, MemoryLedger, PurchaseLedger, RateLedger, Submission, TxHandle};
pub use queue::{MemoryPendingQueue, PendingQueue};
