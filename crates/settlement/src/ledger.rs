//! Settlement ledgers - the durable targets of executed branches
//!
//! A branch is settled with `submit` followed by `wait`. The core retries
//! failed settlements, so implementations must tolerate resubmission.

use async_trait::async_trait;
use parking_lot::Mutex;
use sequencer_types::{BranchItem, BranchKey, BranchSignature, ExchangeRate, Purchase};
use std::collections::{HashMap, HashSet};

use crate::LedgerError;

/// Opaque handle of a submitted settlement transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHandle(pub String);

/// External settlement service for one record type
#[async_trait]
pub trait Ledger<T: BranchItem>: Send + Sync {
    /// Whether the record with this id is already settled
    async fn already_settled(&self, id: u64) -> Result<bool, LedgerError>;

    /// Whether a submission for this branch has settled
    async fn branch_settled(&self, key: BranchKey) -> Result<bool, LedgerError>;

    /// Submit a branch's items together with the validator signatures collected for it
    async fn submit(
        &self,
        key: BranchKey,
        items: &[T],
        signatures: &[BranchSignature],
    ) -> Result<TxHandle, LedgerError>;

    /// Wait for the transaction outcome; `false` means it reverted
    async fn wait(&self, tx: &TxHandle) -> Result<bool, LedgerError>;
}

/// Purchase-ledger collaborator
pub type PurchaseLedger = dyn Ledger<Purchase>;

/// Rate-ledger collaborator
pub type RateLedger = dyn Ledger<ExchangeRate>;

/// How a `MemoryLedger` misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    None,
    /// `submit` returns an error
    Reject,
    /// `wait` reports a reverted transaction
    Revert,
}

/// A recorded submission
#[derive(Debug, Clone)]
pub struct Submission<T> {
    pub key: BranchKey,
    pub items: Vec<T>,
    pub signatures: Vec<BranchSignature>,
}

struct PendingTx {
    key: BranchKey,
    ids: Vec<u64>,
}

struct LedgerState<T> {
    submissions: Vec<Submission<T>>,
    pending_tx: HashMap<TxHandle, PendingTx>,
    settled: HashSet<u64>,
    settled_branches: HashSet<BranchKey>,
    failure: FailureMode,
}

/// In-memory ledger used for local runs and tests
pub struct MemoryLedger<T> {
    name: &'static str,
    /// Id of an item, for records that carry one
    item_id: Option<fn(&T) -> u64>,
    state: Mutex<LedgerState<T>>,
}

impl<T: BranchItem> MemoryLedger<T> {
    pub fn new(name: &'static str, item_id: Option<fn(&T) -> u64>) -> Self {
        Self {
            name,
            item_id,
            state: Mutex::new(LedgerState {
                submissions: Vec::new(),
                pending_tx: HashMap::new(),
                settled: HashSet::new(),
                settled_branches: HashSet::new(),
                failure: FailureMode::None,
            }),
        }
    }

    pub fn set_failure(&self, failure: FailureMode) {
        self.state.lock().failure = failure;
    }

    pub fn submissions(&self) -> Vec<Submission<T>> {
        self.state.lock().submissions.clone()
    }

    pub fn is_settled(&self, id: u64) -> bool {
        self.state.lock().settled.contains(&id)
    }

    pub fn is_branch_settled(&self, key: BranchKey) -> bool {
        self.state.lock().settled_branches.contains(&key)
    }
}

impl MemoryLedger<Purchase> {
    /// Purchases settle by queue id
    pub fn purchases() -> Self {
        Self::new("purchase-ledger", Some(|purchase: &Purchase| purchase.id))
    }
}

impl MemoryLedger<ExchangeRate> {
    /// Rates carry no id and settle per branch
    pub fn rates() -> Self {
        Self::new("rate-ledger", None)
    }
}

#[async_trait]
impl<T: BranchItem> Ledger<T> for MemoryLedger<T> {
    async fn already_settled(&self, id: u64) -> Result<bool, LedgerError> {
        Ok(self.state.lock().settled.contains(&id))
    }

    async fn branch_settled(&self, key: BranchKey) -> Result<bool, LedgerError> {
        Ok(self.state.lock().settled_branches.contains(&key))
    }

    async fn submit(
        &self,
        key: BranchKey,
        items: &[T],
        signatures: &[BranchSignature],
    ) -> Result<TxHandle, LedgerError> {
        let mut state = self.state.lock();
        if state.failure == FailureMode::Reject {
            return Err(LedgerError::Rejected(format!(
                "{} refused {} items of branch {}",
                self.name,
                items.len(),
                key
            )));
        }

        state.submissions.push(Submission {
            key,
            items: items.to_vec(),
            signatures: signatures.to_vec(),
        });
        let tx = TxHandle(format!("{}-{}-{}", self.name, key, state.submissions.len()));
        let ids = match self.item_id {
            Some(item_id) => items.iter().map(item_id).collect(),
            None => Vec::new(),
        };
        state.pending_tx.insert(tx.clone(), PendingTx { key, ids });

        tracing::debug!("{} accepted {} items of branch {}", self.name, items.len(), key);
        Ok(tx)
    }

    async fn wait(&self, tx: &TxHandle) -> Result<bool, LedgerError> {
        let mut state = self.state.lock();
        let pending = state
            .pending_tx
            .remove(tx)
            .ok_or_else(|| LedgerError::UnknownTransaction(tx.0.clone()))?;

        if state.failure == FailureMode::Revert {
            return Ok(false);
        }

        state.settled.extend(pending.ids);
        state.settled_branches.insert(pending.key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequencer_types::ElementType;

    fn purchase(id: u64) -> Purchase {
        Purchase {
            id,
            purchase_id: format!("P-{}", id),
            timestamp: 0,
            wallet: "wallet".to_string(),
            total_amount: 500,
            cash_amount: 0,
            currency: "KRW".to_string(),
            shop_id: "shop".to_string(),
        }
    }

    fn key(height: u64, element_type: ElementType, branch_index: u32) -> BranchKey {
        BranchKey::new(height, element_type, branch_index)
    }

    #[tokio::test]
    async fn test_submit_and_wait_settles() {
        let ledger = MemoryLedger::purchases();
        let branch = key(3, ElementType::Purchase, 0);
        let tx = ledger.submit(branch, &[purchase(7)], &[]).await.unwrap();

        assert!(!ledger.already_settled(7).await.unwrap());
        assert!(ledger.wait(&tx).await.unwrap());
        assert!(ledger.already_settled(7).await.unwrap());
        assert!(ledger.branch_settled(branch).await.unwrap());
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_branches_settle_independently() {
        let ledger = MemoryLedger::rates();
        let rate = ExchangeRate {
            symbol: "USD".to_string(),
            rate: 1,
            timestamp: 0,
        };
        let first = key(9, ElementType::ExchangeRate, 0);
        let second = key(9, ElementType::ExchangeRate, 1);

        let tx = ledger.submit(first, &[rate], &[]).await.unwrap();
        ledger.wait(&tx).await.unwrap();

        assert!(ledger.branch_settled(first).await.unwrap());
        assert!(!ledger.branch_settled(second).await.unwrap());
        assert!(!ledger.is_settled(9));
    }

    #[tokio::test]
    async fn test_failure_modes() {
        let ledger = MemoryLedger::purchases();

        let branch = key(1, ElementType::Purchase, 0);

        ledger.set_failure(FailureMode::Reject);
        assert!(ledger.submit(branch, &[purchase(1)], &[]).await.is_err());
        assert!(ledger.submissions().is_empty());

        ledger.set_failure(FailureMode::Revert);
        let tx = ledger.submit(branch, &[purchase(1)], &[]).await.unwrap();
        assert!(!ledger.wait(&tx).await.unwrap());
        assert!(!ledger.is_settled(1));
        assert!(!ledger.is_branch_settled(branch));

        let unknown = TxHandle("missing".to_string());
        assert!(matches!(
            ledger.wait(&unknown).await,
            Err(LedgerError::UnknownTransaction(_))
        ));
    }
}
