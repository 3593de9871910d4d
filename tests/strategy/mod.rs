//! Strategy-level scenarios: transaction conflict resolution against the
//! server's idempotency key, wallet balance correction, and catalog/stand
//! TTL behavior.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use muninn::adapter::transport::{
    TransportError, TransportResponse, OP_PRODUCT_CATALOG_FETCH, OP_STAND_LIST_FETCH,
    OP_WALLET_FETCH,
};
use muninn::conflict::ConflictResolver;
use muninn::engine::events::EventBus;
use muninn::model::conflict::ConflictStrategy;
use muninn::model::event::SyncEvent;
use muninn::model::operation::OperationStatus;
use muninn::queue::config::SyncQueueConfig;
use muninn::queue::SyncQueue;
use muninn::store::{Product, ProductCache, Stand, StandCache, TransactionCache, WalletCache};
use muninn::strategy::{ProductSync, StandSync, SyncStrategy, TransactionSync, WalletSync};
use muninn::util::cancel::CancelToken;
use muninn_test_utils::prelude::*;

async fn transaction_fixture() -> (
    Arc<SyncQueue>,
    Arc<ConflictResolver>,
    Arc<EventBus>,
    Arc<TransactionCache>,
    Arc<MockTransport>,
) {
    let db = test_db().await.expect("Should build test db");
    let resolver = Arc::new(ConflictResolver::default());
    let events = Arc::new(EventBus::new());
    let queue = Arc::new(SyncQueue::new(
        db,
        SyncQueueConfig::default(),
        Arc::clone(&resolver),
        Arc::clone(&events),
    ));
    let transport = MockTransport::new();
    queue.register_default_handlers(transport.clone());

    (queue, resolver, events, Arc::new(TransactionCache::new()), transport)
}

/// S2: the server deduplicated the second push; the resolver treats it as
/// processed and records a transaction conflict.
#[tokio::test]
async fn server_side_duplicate_counts_as_synced() {
    let (queue, resolver, events, cache, transport) = transaction_fixture().await;

    // Same domain content enqueued twice: two rows with distinct row keys.
    queue
        .add(factory::transaction_create("tx-1", 10, "k1"))
        .await
        .expect("Should add first");
    queue
        .add(factory::transaction_create("tx-1", 10, "k1"))
        .await
        .expect("Should add second");

    transport.script("transaction_create", Ok(TransportResponse::new(200)));
    transport.script(
        "transaction_create",
        Ok(TransportResponse::new(409).with_body(json!({
            "server_version": {"idempotency_key": "k1", "amount": 10, "status": "settled"}
        }))),
    );

    let strategy = TransactionSync::new(
        Arc::clone(&queue),
        resolver,
        Arc::clone(&cache),
        events,
    );
    let result = strategy.execute(&CancelToken::new()).await;

    assert_eq!(result.synced_count, 2);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].entity_type, "transaction");
    assert!(result.errors.is_empty());

    // Both rows are gone.
    let stats = queue.stats().await.expect("Should read stats");
    assert_eq!(stats.total, 0);
}

/// A conflicting server record with a different key is a distinct
/// transaction: the local row stays pending for the next push.
#[tokio::test]
async fn distinct_server_transaction_keeps_local_pending() {
    let (queue, resolver, events, cache, transport) = transaction_fixture().await;

    let operation = queue
        .add(factory::transaction_create("tx-9", 10, "k2"))
        .await
        .expect("Should add");

    transport.script(
        "transaction_create",
        Ok(TransportResponse::new(409).with_body(json!({
            "server_version": {"idempotency_key": "k1", "amount": 10}
        }))),
    );

    let strategy = TransactionSync::new(
        Arc::clone(&queue),
        resolver,
        Arc::clone(&cache),
        events,
    );
    let result = strategy.execute(&CancelToken::new()).await;

    assert_eq!(result.synced_count, 0);
    assert!(result.conflicts.is_empty());

    let row = queue
        .get(&operation.id)
        .await
        .expect("Should read")
        .expect("Row should survive");
    assert_eq!(row.status, OperationStatus::Pending);
    assert!(row.error_code.is_none());
}

/// Transient push failures leave the row pending with its retry scheduled.
#[tokio::test]
async fn transient_push_failure_stays_pending() {
    let (queue, resolver, events, cache, transport) = transaction_fixture().await;

    let operation = queue
        .add(factory::transaction_create("tx-1", 10, "k1"))
        .await
        .expect("Should add");

    transport.script(
        "transaction_create",
        Err(TransportError::Network("airplane mode".into())),
    );

    let strategy = TransactionSync::new(
        Arc::clone(&queue),
        resolver,
        Arc::clone(&cache),
        events,
    );
    let result = strategy.execute(&CancelToken::new()).await;

    assert_eq!(result.synced_count, 0);
    assert!(result.errors.is_empty(), "transient failures are not errors");

    let row = queue
        .get(&operation.id)
        .await
        .expect("Should read")
        .expect("Row should survive");
    assert_eq!(row.status, OperationStatus::Pending);
    assert_eq!(row.retry_count, 1);
    assert!(row.next_retry_at.is_some());
}

/// S4: a diverging server balance corrects the local wallet and logs a
/// server-wins conflict.
#[tokio::test]
async fn wallet_balance_conflict_resolves_server_wins() {
    let resolver = Arc::new(ConflictResolver::default());
    let events = Arc::new(EventBus::new());
    let transport = MockTransport::new();
    transport.set_default(
        OP_WALLET_FETCH,
        TransportResponse::new(200).with_body(json!({"balance": 40, "qr": "qr-fresh"})),
    );

    let cache = Arc::new(WalletCache::new());
    cache.set_balance(42);

    let resolved_events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&resolved_events);
    let _subscription = events.subscribe(move |event| {
        if let SyncEvent::ConflictResolved(record) = event {
            sink.lock().unwrap().push(record.clone());
        }
    });

    let strategy = WalletSync::new(
        transport.clone(),
        resolver,
        Arc::clone(&cache),
        Arc::clone(&events),
    );
    let result = strategy.execute(&CancelToken::new()).await;

    assert!(result.errors.is_empty());
    assert_eq!(result.synced_count, 1);
    assert_eq!(cache.balance_cents(), 40);
    assert_eq!(cache.snapshot().qr_payload.as_deref(), Some("qr-fresh"));
    assert!(cache.last_synced_at().is_some());

    assert_eq!(result.conflicts.len(), 1);
    let record = &result.conflicts[0];
    assert_eq!(record.entity_type, "wallet");
    assert_eq!(record.strategy, ConflictStrategy::ServerWins);
    assert_eq!(record.resolved_value, json!(40));

    let resolved = resolved_events.lock().unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].resolved_value, json!(40));
}

/// A matching balance is not a conflict; the QR still refreshes.
#[tokio::test]
async fn wallet_sync_without_divergence_is_quiet() {
    let resolver = Arc::new(ConflictResolver::default());
    let events = Arc::new(EventBus::new());
    let transport = MockTransport::new();
    transport.set_default(
        OP_WALLET_FETCH,
        TransportResponse::new(200).with_body(json!({"balance": 42, "qr": "qr-fresh"})),
    );

    let cache = Arc::new(WalletCache::new());
    cache.set_balance(42);

    let strategy = WalletSync::new(transport, resolver, Arc::clone(&cache), events);
    let result = strategy.execute(&CancelToken::new()).await;

    assert!(result.conflicts.is_empty());
    assert_eq!(cache.balance_cents(), 42);
    assert_eq!(cache.snapshot().qr_payload.as_deref(), Some("qr-fresh"));
}

/// A fresh catalog inside the TTL is not re-fetched.
#[tokio::test]
async fn product_sync_respects_ttl() {
    let transport = MockTransport::new();
    transport.set_default(
        OP_PRODUCT_CATALOG_FETCH,
        TransportResponse::new(200).with_body(json!({
            "products": [
                {"id": "p1", "name": "Beer", "price_cents": 650, "category": "drinks"},
                {"id": "p2", "name": "Fries", "price_cents": 450}
            ]
        })),
    );

    let cache = Arc::new(ProductCache::new());
    let strategy = ProductSync::new(
        transport.clone(),
        Arc::clone(&cache),
        Duration::from_secs(300),
    );

    let result = strategy.execute(&CancelToken::new()).await;
    assert_eq!(result.synced_count, 2);
    assert_eq!(cache.products().len(), 2);
    assert_eq!(transport.call_count(OP_PRODUCT_CATALOG_FETCH), 1);

    // Second run inside the TTL: no fetch.
    let result = strategy.execute(&CancelToken::new()).await;
    assert_eq!(result.synced_count, 0);
    assert_eq!(transport.call_count(OP_PRODUCT_CATALOG_FETCH), 1);
}

/// A failed catalog fetch keeps the cached products and is non-fatal.
#[tokio::test]
async fn product_sync_falls_back_to_cache() {
    let transport = MockTransport::new();
    transport.script(OP_PRODUCT_CATALOG_FETCH, Ok(TransportResponse::new(500)));

    let cache = Arc::new(ProductCache::new());
    cache.replace(vec![Product {
        id: "p1".into(),
        name: "Beer".into(),
        price_cents: 650,
        category: None,
        available: true,
    }]);

    // Zero TTL forces a refresh attempt.
    let strategy = ProductSync::new(transport, Arc::clone(&cache), Duration::ZERO);
    let result = strategy.execute(&CancelToken::new()).await;

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, "FETCH_FAILED");
    assert_eq!(cache.products().len(), 1, "cached catalog survives");
}

/// The stand list refresh keeps the operator's current stand up to date.
#[tokio::test]
async fn stand_sync_updates_current_stand() {
    let transport = MockTransport::new();
    transport.set_default(
        OP_STAND_LIST_FETCH,
        TransportResponse::new(200).with_body(json!({
            "stands": [
                {"id": "s1", "name": "North Bar", "zone": "north", "open": false},
                {"id": "s2", "name": "Merch", "zone": "east"}
            ]
        })),
    );

    let cache = Arc::new(StandCache::new());
    cache.set_current(Some("s1".into()));
    cache.replace(vec![Stand {
        id: "s1".into(),
        name: "North Bar".into(),
        zone: Some("north".into()),
        open: true,
    }]);

    // Stale list: the TTL is zero so the refresh always runs.
    let strategy = StandSync::new(transport, Arc::clone(&cache), Duration::ZERO);
    let result = strategy.execute(&CancelToken::new()).await;

    assert_eq!(result.synced_count, 2);
    let current = cache.current().expect("current stand resolves");
    assert!(!current.open, "current stand reflects the fresh list");
}
