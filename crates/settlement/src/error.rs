//! Collaborator errors

use thiserror::Error;

/// Pending-queue failures
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("pending queue unavailable: {0}")]
    Unavailable(String),
}

/// Settlement ledger failures
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("unknown transaction {0}")]
    UnknownTransaction(String),
}
