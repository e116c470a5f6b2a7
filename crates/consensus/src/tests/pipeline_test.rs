//! Pipeline Scenario Tests
//!
//! Drives a node with all five tasks over in-memory collaborators:
//! - purchases from proposal through finalization
//! - cancellation when settlement keeps failing
//! - exchange-rate and burn-point branches
//! - queue outages, early ticks and replay from a peer

use sequencer_types::{BranchKey, BranchStatus, ElementType, BRANCH_CAPACITY};
use settlement_bridge::FailureMode;

use super::test_helpers::{burn_point, purchase, rate, Pipeline, GENESIS_TIME};
use crate::config::now_secs;

#[tokio::test]
async fn test_purchase_is_finalized_end_to_end() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.queue.push_purchase(purchase(1));

    pipeline.tick().await;
    assert_eq!(pipeline.node.head_height(), 1);
    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Proofed));
    assert_eq!(pipeline.queue.in_flight_ids(), vec![1]);

    let attestations = pipeline.node.signatures(1, ElementType::Purchase).await.unwrap();
    assert_eq!(attestations.len(), 4);

    pipeline.tick().await;
    assert_eq!(pipeline.node.head_height(), 2);
    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Executed));
    assert_eq!(pipeline.queue.settled_ids(), vec![1]);
    assert!(pipeline.purchase_ledger.is_settled(1));

    let submissions = pipeline.purchase_ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].key.height, 1);
    assert_eq!(submissions[0].signatures.len(), 4);

    // The next block carries the attestations forward
    let carrier = pipeline.node.block(2).await.unwrap();
    assert_eq!(carrier.purchases.signatures, attestations);

    pipeline.run_to(8).await;
    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Executed));

    pipeline.tick().await;
    assert_eq!(pipeline.node.head_height(), 9);
    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Finalized));
    assert_eq!(pipeline.purchase_ledger.submissions().len(), 1);
}

#[tokio::test]
async fn test_failed_settlement_is_canceled() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.purchase_ledger.set_failure(FailureMode::Reject);
    pipeline.queue.push_purchase(purchase(7));

    pipeline.run_to(8).await;
    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Approved));
    assert_eq!(pipeline.queue.in_flight_ids(), vec![7]);

    pipeline.tick().await;
    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Canceled));
    assert_eq!(pipeline.queue.canceled_ids(), vec![7]);
    assert!(pipeline.queue.in_flight_ids().is_empty());
    assert!(pipeline.purchase_ledger.submissions().is_empty());
}

#[tokio::test]
async fn test_reverted_settlement_is_retried() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.purchase_ledger.set_failure(FailureMode::Revert);
    pipeline.queue.push_purchase(purchase(3));

    pipeline.run_to(2).await;
    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Approved));
    assert!(!pipeline.purchase_ledger.is_settled(3));

    pipeline.purchase_ledger.set_failure(FailureMode::None);
    pipeline.tick().await;
    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Executed));
    assert_eq!(pipeline.queue.settled_ids(), vec![3]);
    assert_eq!(pipeline.purchase_ledger.submissions().len(), 2);
}

#[tokio::test]
async fn test_full_branches_settle_separately() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    for id in 0..BRANCH_CAPACITY as u64 + 1 {
        pipeline.queue.push_purchase(purchase(id));
    }

    pipeline.run_to(2).await;

    let block = pipeline.node.block(1).await.unwrap();
    assert_eq!(block.branch_count(ElementType::Purchase), 2);
    assert_eq!(pipeline.purchase_ledger.submissions().len(), 2);
    assert_eq!(pipeline.queue.settled_ids().len(), BRANCH_CAPACITY + 1);
}

#[tokio::test]
async fn test_rate_submitted_one_behind_head() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.queue.push_rate(rate("USD", 1_350_000_000_000_000_000_000));

    pipeline.run_to(2).await;

    assert_eq!(
        pipeline.status(1, ElementType::ExchangeRate).await,
        Some(BranchStatus::Executed)
    );
    let submissions = pipeline.rate_ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].key.height, 1);
    assert_eq!(submissions[0].items[0].symbol, "USD");
    assert!(pipeline
        .rate_ledger
        .is_branch_settled(BranchKey::new(1, ElementType::ExchangeRate, 0)));
}

#[tokio::test]
async fn test_every_rate_branch_of_a_slot_is_submitted() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    for i in 0..BRANCH_CAPACITY + 1 {
        pipeline
            .queue
            .push_rate(rate(&format!("SYM{}", i), 1_000 + i as u128));
    }

    pipeline.run_to(2).await;

    let block = pipeline.node.block(1).await.unwrap();
    assert_eq!(block.branch_count(ElementType::ExchangeRate), 2);

    let mut sizes: Vec<(u32, usize)> = pipeline
        .rate_ledger
        .submissions()
        .iter()
        .map(|s| (s.key.branch_index, s.items.len()))
        .collect();
    sizes.sort();
    assert_eq!(sizes, vec![(0, BRANCH_CAPACITY), (1, 1)]);

    for index in 0..2 {
        let key = BranchKey::new(1, ElementType::ExchangeRate, index);
        assert_eq!(
            pipeline.node.branch_status(&key).await.unwrap(),
            Some(BranchStatus::Executed)
        );
        assert!(pipeline.rate_ledger.is_branch_settled(key));
    }
}

#[tokio::test]
async fn test_stale_rate_branch_passes_through() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.rate_ledger.set_failure(FailureMode::Reject);
    pipeline.queue.push_rate(rate("JPY", 9_000_000_000_000_000_000));

    pipeline.run_to(2).await;
    assert_eq!(
        pipeline.status(1, ElementType::ExchangeRate).await,
        Some(BranchStatus::Approved)
    );

    // Once the head has moved past the next slot the branch is executed without a submission
    pipeline.rate_ledger.set_failure(FailureMode::None);
    pipeline.tick().await;
    assert_eq!(
        pipeline.status(1, ElementType::ExchangeRate).await,
        Some(BranchStatus::Executed)
    );
    assert!(pipeline.rate_ledger.submissions().is_empty());
}

#[tokio::test]
async fn test_burn_points_pass_through() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.queue.push_burn_point(burn_point(1));
    pipeline.queue.push_burn_point(burn_point(2));

    pipeline.run_to(2).await;

    assert_eq!(
        pipeline.status(1, ElementType::BurnPoint).await,
        Some(BranchStatus::Executed)
    );
    assert!(pipeline.purchase_ledger.submissions().is_empty());
    assert!(pipeline.rate_ledger.submissions().is_empty());

    pipeline.run_to(9).await;
    assert_eq!(
        pipeline.status(1, ElementType::BurnPoint).await,
        Some(BranchStatus::Finalized)
    );
}

#[tokio::test]
async fn test_queue_outage_produces_no_block() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.queue.push_purchase(purchase(1));
    pipeline.queue.set_unavailable(true);

    pipeline.tick().await;
    assert_eq!(pipeline.node.head_height(), 0);
    assert!(pipeline.node.find_block(1).await.unwrap().is_none());

    pipeline.queue.set_unavailable(false);
    pipeline.tick().await;
    assert_eq!(pipeline.node.head_height(), 1);
    assert_eq!(pipeline.queue.in_flight_ids(), vec![1]);
}

#[tokio::test]
async fn test_partial_pull_returns_records_to_queue() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.queue.push_purchase(purchase(1));
    pipeline.queue.push_rate(rate("EUR", 1_450));
    pipeline.queue.push_burn_point(burn_point(5));
    pipeline.faults.fail_next_burn_point_pull();

    pipeline.tick().await;
    assert_eq!(pipeline.node.head_height(), 0);
    assert_eq!(pipeline.queue.pending_ids(), vec![1]);
    assert!(pipeline.queue.in_flight_ids().is_empty());

    pipeline.tick().await;
    assert_eq!(pipeline.node.head_height(), 1);
    let block = pipeline.node.block(1).await.unwrap();
    assert_eq!(block.purchases.item_count(), 1);
    assert_eq!(block.exchange_rates.item_count(), 1);
    assert_eq!(block.exchange_rates.branches[0].items[0].symbol, "EUR");
    assert_eq!(block.burn_points.item_count(), 1);
}

#[tokio::test]
async fn test_refused_cancellation_is_retried() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.purchase_ledger.set_failure(FailureMode::Reject);
    pipeline.queue.push_purchase(purchase(7));

    pipeline.run_to(8).await;
    pipeline.faults.refuse_cancellations(true);
    pipeline.tick().await;

    assert_eq!(pipeline.status(1, ElementType::Purchase).await, Some(BranchStatus::Canceled));
    assert_eq!(pipeline.queue.in_flight_ids(), vec![7]);
    assert!(pipeline.queue.canceled_ids().is_empty());

    pipeline.faults.refuse_cancellations(false);
    pipeline.tick().await;
    assert_eq!(pipeline.queue.canceled_ids(), vec![7]);
    assert!(pipeline.queue.in_flight_ids().is_empty());
}

#[tokio::test]
async fn test_settlement_retried_until_slot_is_resolved() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.purchase_ledger.set_failure(FailureMode::Reject);
    pipeline.run_to(3).await;
    pipeline.queue.push_purchase(purchase(4));
    pipeline.tick().await;
    assert_eq!(pipeline.node.block(4).await.unwrap().purchases.item_count(), 1);

    pipeline.run_to(10).await;
    assert_eq!(pipeline.status(4, ElementType::Purchase).await, Some(BranchStatus::Approved));

    // Slot 4 is resolved at head 12, so head 11 still retries it
    pipeline.purchase_ledger.set_failure(FailureMode::None);
    pipeline.tick().await;
    assert_eq!(pipeline.node.head_height(), 11);
    assert_eq!(pipeline.status(4, ElementType::Purchase).await, Some(BranchStatus::Executed));
    assert_eq!(pipeline.queue.settled_ids(), vec![4]);

    pipeline.tick().await;
    assert_eq!(pipeline.status(4, ElementType::Purchase).await, Some(BranchStatus::Finalized));
}

#[tokio::test]
async fn test_nothing_proposed_before_slot_is_due() {
    let pipeline = Pipeline::start(now_secs() + 3_600).await;
    pipeline.queue.push_purchase(purchase(1));

    pipeline.tick().await;
    pipeline.tick().await;

    assert_eq!(pipeline.node.head_height(), 0);
    assert_eq!(pipeline.queue.pending_ids(), vec![1]);
}

#[tokio::test]
async fn test_blocks_are_signed_by_the_elected_proposer() {
    let pipeline = Pipeline::start(GENESIS_TIME).await;
    pipeline.queue.push_purchase(purchase(1));
    pipeline.run_to(6).await;

    for height in 1..=6 {
        let block = pipeline.node.block(height).await.unwrap();
        let proposer = pipeline.validators.proposer(height).address();
        assert!(block.header.verify_proposer(&proposer));

        let other = pipeline.validators.proposer(height + 1).address();
        assert!(!block.header.verify_proposer(&other));
    }

    let proposer = pipeline.validators.proposer(1).address();
    let attestations = pipeline.node.signatures(1, ElementType::Purchase).await.unwrap();
    assert!(attestations.iter().all(|s| s.account != proposer));
}

#[tokio::test]
async fn test_replayed_blocks_reach_the_same_state() {
    let leader = Pipeline::start(GENESIS_TIME).await;
    leader.queue.push_purchase(purchase(1));
    leader.run_to(2).await;

    let follower = Pipeline::start(GENESIS_TIME).await;
    assert_eq!(follower.node.head_hash(), leader.node.block(0).await.unwrap().hash());

    let sender = follower.node.command_sender();
    for height in 1..=2 {
        sender
            .replay_block(leader.node.block(height).await.unwrap())
            .unwrap();
    }
    follower.tick().await;

    // Replay applies both blocks before the follower proposes its own
    assert_eq!(
        follower.node.block(2).await.unwrap().hash(),
        leader.node.block(2).await.unwrap().hash()
    );
    assert_eq!(follower.node.head_height(), 3);
    assert_eq!(follower.status(1, ElementType::Purchase).await, Some(BranchStatus::Executed));
    assert!(follower.purchase_ledger.is_settled(1));
}
