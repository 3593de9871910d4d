//! Tests for queue statistics, listing filters, and garbage collection.

use std::time::Duration;

use serde_json::json;

use crate::model::operation::{
    CrudOp, NewOperation, OperationMetadata, OperationStatus, OperationType, OperationUpdate,
    Priority,
};
use crate::queue::data::OperationFilter;
use crate::util::test::test_queue;

fn op(op_type: OperationType, entity_id: &str) -> NewOperation {
    NewOperation::new(
        op_type,
        CrudOp::Create,
        entity_id,
        json!({}),
        OperationMetadata {
            device_id: "device-1".into(),
            user_id: "user-1".into(),
            ..Default::default()
        },
    )
}

/// Expect stats to aggregate by status, priority, and type
#[tokio::test]
async fn stats_aggregate_counters() {
    let queue = test_queue().await;

    let tx = queue
        .add(op(OperationType::TransactionCreate, "tx-1"))
        .await
        .expect("Should add");
    queue
        .add(op(OperationType::FavoriteAdd, "artist-1"))
        .await
        .expect("Should add");
    queue
        .add(op(OperationType::FavoriteAdd, "artist-2"))
        .await
        .expect("Should add");

    queue
        .update(&tx.id, OperationUpdate::status(OperationStatus::Completed))
        .await
        .expect("Should complete");

    let stats = queue.stats().await.expect("Should read stats");

    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending_count(), 2);
    assert_eq!(stats.by_status.get("completed"), Some(&1));
    assert_eq!(
        stats.pending_by_priority.get(Priority::Normal.as_str()),
        Some(&2)
    );
    assert_eq!(stats.by_type.get("favorite_add"), Some(&2));
    assert_eq!(stats.by_type.get("transaction_create"), Some(&1));
    assert!(stats.oldest_pending_at.is_some());
    assert!(stats.last_completed_at.is_some());
}

/// Expect list filters to narrow by status and type with a limit
#[tokio::test]
async fn list_filters_apply() {
    let queue = test_queue().await;

    for i in 0..3 {
        queue
            .add(op(OperationType::FavoriteAdd, &format!("artist-{i}")))
            .await
            .expect("Should add");
    }
    let tx = queue
        .add(op(OperationType::TransactionCreate, "tx-1"))
        .await
        .expect("Should add");
    queue
        .update(&tx.id, OperationUpdate::status(OperationStatus::Failed))
        .await
        .expect("Should fail");

    let favorites = queue
        .list(OperationFilter {
            op_type: Some(OperationType::FavoriteAdd),
            ..Default::default()
        })
        .await
        .expect("Should list favorites");
    assert_eq!(favorites.len(), 3);

    let failed = queue
        .list(OperationFilter {
            status: Some(OperationStatus::Failed),
            ..Default::default()
        })
        .await
        .expect("Should list failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, tx.id);

    let limited = queue
        .list(OperationFilter {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .expect("Should list limited");
    assert_eq!(limited.len(), 2);
}

/// Expect cleanup to remove only old completed rows
#[tokio::test]
async fn cleanup_completed_respects_age() {
    let queue = test_queue().await;

    let done = queue
        .add(op(OperationType::ProfileUpdate, "user-1"))
        .await
        .expect("Should add");
    queue
        .add(op(OperationType::ProfileUpdate, "user-2"))
        .await
        .expect("Should add");

    queue
        .update(&done.id, OperationUpdate::status(OperationStatus::Completed))
        .await
        .expect("Should complete");

    // A generous max age keeps the fresh completed row.
    let removed = queue
        .cleanup_completed(Duration::from_secs(3600))
        .await
        .expect("Should clean");
    assert_eq!(removed, 0);

    // Zero max age collects it.
    let removed = queue
        .cleanup_completed(Duration::ZERO)
        .await
        .expect("Should clean");
    assert_eq!(removed, 1);

    let stats = queue.stats().await.expect("Should read stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending_count(), 1);
}

/// Expect clear_all to empty the queue
#[tokio::test]
async fn clear_all_empties_queue() {
    let queue = test_queue().await;

    for i in 0..4 {
        queue
            .add(op(OperationType::FavoriteAdd, &format!("artist-{i}")))
            .await
            .expect("Should add");
    }

    let removed = queue.clear_all().await.expect("Should clear");
    assert_eq!(removed, 4);

    let stats = queue.stats().await.expect("Should read stats");
    assert_eq!(stats.total, 0);
}

/// Expect remove to delete a single row
#[tokio::test]
async fn remove_deletes_single_row() {
    let queue = test_queue().await;

    let operation = queue
        .add(op(OperationType::FavoriteAdd, "artist-1"))
        .await
        .expect("Should add");

    assert!(queue.remove(&operation.id).await.expect("Should remove"));
    assert!(!queue.remove(&operation.id).await.expect("Second remove is a no-op"));
    assert!(queue
        .get(&operation.id)
        .await
        .expect("Should read")
        .is_none());
}

/// Expect the device id to be provisioned once and then stable
#[tokio::test]
async fn device_id_is_stable() {
    let queue = test_queue().await;

    let first = queue.device_id().await.expect("Should provision device id");
    let second = queue.device_id().await.expect("Should read device id");

    assert!(first.starts_with("device_"));
    assert_eq!(first, second);
}

/// Expect per-entity pending counts to track the queue
#[tokio::test]
async fn pending_counts_by_entity() {
    let queue = test_queue().await;

    queue
        .add(op(OperationType::TransactionCreate, "tx-1"))
        .await
        .expect("Should add");
    queue
        .add(op(OperationType::NfcPayment, "tx-2"))
        .await
        .expect("Should add");
    queue
        .add(op(OperationType::WalletTopup, "wallet-1"))
        .await
        .expect("Should add");

    assert_eq!(
        queue
            .count_pending_for_entity("transaction")
            .await
            .expect("Should count"),
        2
    );
    assert_eq!(
        queue
            .count_pending_for_entity("wallet")
            .await
            .expect("Should count"),
        1
    );
    assert_eq!(
        queue
            .count_pending_for_entity("stand")
            .await
            .expect("Should count"),
        0
    );
}
