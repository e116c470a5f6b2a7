//! Pending-record queue
//!
//! Purchases move pending -> in-flight when pulled into a block, then to
//! settled or canceled once their branch resolves. A block that is never
//! persisted hands its purchases back with `requeue`, and its rates and burn
//! points with `requeue_rates` and `requeue_burn_points`.

use async_trait::async_trait;
use parking_lot::Mutex;
use sequencer_types::{BurnPoint, ExchangeRate, Purchase};
use std::collections::{BTreeMap, BTreeSet};

use crate::QueueError;

/// Source of records to sequence
#[async_trait]
pub trait PendingQueue: Send + Sync {
    /// Purchases that have waited at least `wait_seconds`; returned ids become in-flight
    async fn pull_pending_purchases(&self, wait_seconds: u64) -> Result<Vec<Purchase>, QueueError>;

    /// Rate updates since the previous pull
    async fn pull_pending_rates(&self) -> Result<Vec<ExchangeRate>, QueueError>;

    /// Burn points since the previous pull
    async fn pull_pending_burn_points(&self) -> Result<Vec<BurnPoint>, QueueError> {
        Ok(Vec::new())
    }

    async fn mark_settled(&self, ids: &[u64]) -> Result<(), QueueError>;

    async fn mark_canceled(&self, ids: &[u64]) -> Result<(), QueueError>;

    /// Return in-flight purchases to pending
    async fn requeue(&self, ids: &[u64]) -> Result<(), QueueError>;

    /// Put pulled rates back ahead of anything pushed since
    async fn requeue_rates(&self, rates: Vec<ExchangeRate>) -> Result<(), QueueError>;

    async fn requeue_burn_points(&self, _burn_points: Vec<BurnPoint>) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Default)]
struct QueueState {
    pending: BTreeMap<u64, Purchase>,
    in_flight: BTreeMap<u64, Purchase>,
    settled: BTreeSet<u64>,
    canceled: BTreeSet<u64>,
    rates: Vec<ExchangeRate>,
    burn_points: Vec<BurnPoint>,
    unavailable: bool,
}

/// In-memory pending queue
#[derive(Default)]
pub struct MemoryPendingQueue {
    state: Mutex<QueueState>,
}

impl MemoryPendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_purchase(&self, purchase: Purchase) {
        self.state.lock().pending.insert(purchase.id, purchase);
    }

    pub fn push_rate(&self, rate: ExchangeRate) {
        self.state.lock().rates.push(rate);
    }

    pub fn push_burn_point(&self, burn_point: BurnPoint) {
        self.state.lock().burn_points.push(burn_point);
    }

    /// Make every call fail, as if the backing store were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn pending_ids(&self) -> Vec<u64> {
        self.state.lock().pending.keys().copied().collect()
    }

    pub fn in_flight_ids(&self) -> Vec<u64> {
        self.state.lock().in_flight.keys().copied().collect()
    }

    pub fn settled_ids(&self) -> Vec<u64> {
        self.state.lock().settled.iter().copied().collect()
    }

    pub fn canceled_ids(&self) -> Vec<u64> {
        self.state.lock().canceled.iter().copied().collect()
    }

    fn check_available(state: &QueueState) -> Result<(), QueueError> {
        if state.unavailable {
            return Err(QueueError::Unavailable("memory queue switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PendingQueue for MemoryPendingQueue {
    async fn pull_pending_purchases(&self, wait_seconds: u64) -> Result<Vec<Purchase>, QueueError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let mut state = self.state.lock();
        Self::check_available(&state)?;

        let ready: Vec<u64> = state
            .pending
            .values()
            .filter(|p| p.timestamp.saturating_add(wait_seconds) <= now)
            .map(|p| p.id)
            .collect();

        let mut pulled = Vec::with_capacity(ready.len());
        for id in ready {
            if let Some(purchase) = state.pending.remove(&id) {
                state.in_flight.insert(id, purchase.clone());
                pulled.push(purchase);
            }
        }

        Ok(pulled)
    }

    async fn pull_pending_rates(&self) -> Result<Vec<ExchangeRate>, QueueError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        Ok(std::mem::take(&mut state.rates))
    }

    async fn pull_pending_burn_points(&self) -> Result<Vec<BurnPoint>, QueueError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        Ok(std::mem::take(&mut state.burn_points))
    }

    async fn mark_settled(&self, ids: &[u64]) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        for id in ids {
            state.in_flight.remove(id);
            state.pending.remove(id);
            state.settled.insert(*id);
        }
        tracing::debug!("Marked {} purchases settled", ids.len());
        Ok(())
    }

    async fn mark_canceled(&self, ids: &[u64]) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        for id in ids {
            state.in_flight.remove(id);
            state.pending.remove(id);
            state.canceled.insert(*id);
        }
        tracing::debug!("Marked {} purchases canceled", ids.len());
        Ok(())
    }

    async fn requeue(&self, ids: &[u64]) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        for id in ids {
            if let Some(purchase) = state.in_flight.remove(id) {
                state.pending.insert(*id, purchase);
            }
        }
        Ok(())
    }

    async fn requeue_rates(&self, rates: Vec<ExchangeRate>) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        let newer = std::mem::replace(&mut state.rates, rates);
        state.rates.extend(newer);
        Ok(())
    }

    async fn requeue_burn_points(&self, burn_points: Vec<BurnPoint>) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        Self::check_available(&state)?;
        let newer = std::mem::replace(&mut state.burn_points, burn_points);
        state.burn_points.extend(newer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(id: u64, timestamp: u64) -> Purchase {
        Purchase {
            id,
            purchase_id: format!("P-{}", id),
            timestamp,
            wallet: "wallet".to_string(),
            total_amount: 1_000,
            cash_amount: 1_000,
            currency: "KRW".to_string(),
            shop_id: "shop".to_string(),
        }
    }

    #[tokio::test]
    async fn test_pull_moves_to_in_flight() {
        let queue = MemoryPendingQueue::new();
        queue.push_purchase(purchase(1, 0));
        queue.push_purchase(purchase(2, 0));

        let pulled = queue.pull_pending_purchases(0).await.unwrap();
        assert_eq!(pulled.len(), 2);
        assert!(queue.pending_ids().is_empty());
        assert_eq!(queue.in_flight_ids(), vec![1, 2]);

        // Nothing is handed out twice
        assert!(queue.pull_pending_purchases(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wait_threshold_holds_back_fresh_purchases() {
        let queue = MemoryPendingQueue::new();
        let now = chrono::Utc::now().timestamp() as u64;
        queue.push_purchase(purchase(1, 0));
        queue.push_purchase(purchase(2, now + 3_600));

        let pulled = queue.pull_pending_purchases(60).await.unwrap();
        assert_eq!(pulled.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(queue.pending_ids(), vec![2]);
    }

    #[tokio::test]
    async fn test_settle_cancel_requeue() {
        let queue = MemoryPendingQueue::new();
        for id in 1..=3 {
            queue.push_purchase(purchase(id, 0));
        }
        queue.pull_pending_purchases(0).await.unwrap();

        queue.mark_settled(&[1]).await.unwrap();
        queue.mark_canceled(&[2]).await.unwrap();
        queue.requeue(&[3]).await.unwrap();

        assert_eq!(queue.settled_ids(), vec![1]);
        assert_eq!(queue.canceled_ids(), vec![2]);
        assert_eq!(queue.pending_ids(), vec![3]);
        assert!(queue.in_flight_ids().is_empty());
    }

    #[tokio::test]
    async fn test_rates_are_drained() {
        let queue = MemoryPendingQueue::new();
        queue.push_rate(ExchangeRate {
            symbol: "USD".to_string(),
            rate: 1_300,
            timestamp: 1,
        });

        assert_eq!(queue.pull_pending_rates().await.unwrap().len(), 1);
        assert!(queue.pull_pending_rates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requeued_rates_keep_their_place() {
        let queue = MemoryPendingQueue::new();
        let usd = |rate| ExchangeRate {
            symbol: "USD".to_string(),
            rate,
            timestamp: 1,
        };
        queue.push_rate(usd(1));
        queue.push_rate(usd(2));
        let pulled = queue.pull_pending_rates().await.unwrap();

        queue.push_rate(usd(3));
        queue.requeue_rates(pulled).await.unwrap();

        let rates: Vec<u128> = queue
            .pull_pending_rates()
            .await
            .unwrap()
            .iter()
            .map(|r| r.rate)
            .collect();
        assert_eq!(rates, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_requeued_burn_points_are_pulled_again() {
        let queue = MemoryPendingQueue::new();
        queue.push_burn_point(BurnPoint {
            id: 4,
            account: "account".to_string(),
            amount: 10,
            timestamp: 1,
        });
        let pulled = queue.pull_pending_burn_points().await.unwrap();
        assert!(queue.pull_pending_burn_points().await.unwrap().is_empty());

        queue.requeue_burn_points(pulled).await.unwrap();
        let again = queue.pull_pending_burn_points().await.unwrap();
        assert_eq!(again.iter().map(|b| b.id).collect::<Vec<_>>(), vec![4]);
    }

    #[tokio::test]
    async fn test_unavailable_queue_fails() {
        let queue = MemoryPendingQueue::new();
        queue.set_unavailable(true);

        assert!(queue.pull_pending_purchases(0).await.is_err());
        assert!(queue.mark_settled(&[1]).await.is_err());
    }
}
