//! End-to-end engine scenarios: offline replay, throttling, cancellation,
//! lifecycle, and state transitions.
//!
//! Every test that initializes the engine holds [`engine_lock`] because the
//! engine is a process-wide singleton.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use muninn::adapter::app_state::AppLifecycleState;
use muninn::engine::{EngineState, SyncOptions};
use muninn::error::Error;
use muninn::model::operation::{OperationStatus, Priority};
use muninn::SyncEngine;
use muninn_test_utils::prelude::*;

fn event_recorder(engine: &SyncEngine) -> (Arc<Mutex<Vec<String>>>, muninn::engine::events::EventSubscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = engine.on(move |event| {
        sink.lock().unwrap().push(event.name().to_string());
    });
    (seen, subscription)
}

/// S1: a payment enqueued offline replays once the device is online.
#[tokio::test]
async fn offline_payment_replays_when_online() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    let network = MockNetwork::new(false);
    let app_state = MockAppState::new();

    let engine = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await?;
    assert_eq!(engine.state(), EngineState::Offline);

    let operation = engine
        .enqueue(factory::transaction_create("tx-1", 10, "k1"))
        .await?;
    assert_eq!(operation.status, OperationStatus::Pending);
    assert_eq!(operation.priority, Priority::Critical);

    // Offline: a single-error result, nothing reaches the transport.
    let result = engine.sync().await?;
    assert!(!result.success);
    assert_eq!(result.errors[0].code, "NETWORK_UNAVAILABLE");
    assert_eq!(transport.total_calls(), 0);

    network.set_online(true);
    let result = engine
        .sync_with(SyncOptions {
            force: true,
            timeout: None,
        })
        .await?;

    assert!(result.success);
    assert_eq!(result.synced.transactions, 1);
    assert_eq!(transport.call_count("transaction_create"), 1);

    // The pushed row is gone and nothing is left mid-flight.
    let stats = engine.stats().await?;
    assert_eq!(stats.total, 0);
    assert_eq!(stats.in_progress_count(), 0);

    engine.shutdown().await?;
    Ok(())
}

/// S5: a second sync inside the throttle window is a zero-work success.
#[tokio::test]
async fn throttle_short_circuits_rapid_syncs() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    let network = MockNetwork::new(true);
    let app_state = MockAppState::new();

    let engine = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await?;

    let first = engine.sync().await?;
    assert!(first.success);
    assert!(!first.throttled);
    let calls_after_first = transport.total_calls();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = engine.sync().await?;
    assert!(second.success);
    assert!(second.throttled);
    assert_eq!(second.synced.total(), 0);
    assert_eq!(second.duration, Duration::ZERO);
    // No handler or pull ran for the throttled call.
    assert_eq!(transport.total_calls(), calls_after_first);

    engine.shutdown().await?;
    Ok(())
}

/// S6: cancellation lets the current strategy finish and skips the rest.
#[tokio::test]
async fn cancellation_stops_after_current_strategy() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    // A slow wallet pull gives the test a window to cancel inside.
    transport.set_delay("wallet_fetch", Duration::from_millis(300));
    let network = MockNetwork::new(true);
    let app_state = MockAppState::new();

    let engine = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await?;
    let (events, _subscription) = event_recorder(&engine);

    engine
        .enqueue(factory::transaction_create("tx-1", 10, "k1"))
        .await?;

    let runner = engine.clone();
    let run = tokio::spawn(async move {
        runner
            .sync_with(SyncOptions {
                force: true,
                timeout: None,
            })
            .await
    });

    // Let the transaction push finish and the wallet pull begin.
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.cancel_sync();

    let result = run.await.expect("sync task should not panic")?;

    // The first strategy's counts are kept; the wallet strategy ran to
    // completion; products and stands never started.
    assert_eq!(result.synced.transactions, 1);
    assert_eq!(transport.call_count("product_catalog_fetch"), 0);
    assert_eq!(transport.call_count("stand_list_fetch"), 0);

    let seen = events.lock().unwrap();
    assert!(seen.contains(&"sync_cancelled".to_string()));
    assert!(!seen.contains(&"sync_completed".to_string()));

    engine.shutdown().await?;
    Ok(())
}

/// A run that overruns its timeout fails with TIMEOUT, is retried by the
/// engine with retry_delay spacing, and leaves no operation stranded in
/// progress.
#[tokio::test]
async fn whole_sync_timeout_retries_and_recovers() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    // Every push stalls well past the per-call timeout below.
    transport.set_delay("transaction_create", Duration::from_millis(500));
    let network = MockNetwork::new(true);
    let app_state = MockAppState::new();

    let mut config = test_config();
    config.max_retry_attempts = 2;
    config.retry_delay = Duration::from_millis(50);

    let engine =
        SyncEngine::initialize(config, transport.clone(), network.clone(), app_state.clone())
            .await?;
    let (events, _subscription) = event_recorder(&engine);

    engine
        .enqueue(factory::transaction_create("tx-1", 10, "k1"))
        .await?;

    let result = engine
        .sync_with(SyncOptions {
            force: true,
            timeout: Some(Duration::from_millis(100)),
        })
        .await?;

    assert!(!result.success);
    assert_eq!(result.errors[0].code, "TIMEOUT");
    assert_eq!(engine.state(), EngineState::Error);

    // Whole-sync retry is distinct from per-operation retries: the initial
    // attempt plus two engine-level retries each reached the transport.
    assert_eq!(transport.call_count("transaction_create"), 3);

    // The aborted push is not orphaned: its row went back to pending.
    let stats = engine.stats().await?;
    assert_eq!(stats.in_progress_count(), 0);
    assert_eq!(stats.pending_count(), 1);

    let seen = events.lock().unwrap().clone();
    assert!(seen.contains(&"sync_failed".to_string()));
    assert!(!seen.contains(&"sync_cancelled".to_string()));

    engine.shutdown().await?;
    Ok(())
}

/// Expect a sync call during an in-flight run to await and share its result.
#[tokio::test]
async fn concurrent_sync_awaits_inflight_run() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    transport.set_delay("wallet_fetch", Duration::from_millis(200));
    let network = MockNetwork::new(true);
    let app_state = MockAppState::new();

    let engine = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await?;

    let first = engine.clone();
    let first_run = tokio::spawn(async move {
        first
            .sync_with(SyncOptions {
                force: true,
                timeout: None,
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.state(), EngineState::Syncing);

    // Joins the in-flight run instead of starting a second one.
    let second = engine
        .sync_with(SyncOptions {
            force: true,
            timeout: None,
        })
        .await?;
    let first = first_run.await.expect("sync task should not panic")?;

    assert!(first.success);
    assert!(second.success);
    assert_eq!(transport.call_count("wallet_fetch"), 1);

    engine.shutdown().await?;
    Ok(())
}

/// Property: while the network is offline, the engine never leaves offline.
#[tokio::test]
async fn offline_state_is_sticky_until_online() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    let network = MockNetwork::new(false);
    let app_state = MockAppState::new();

    let engine = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await?;
    assert_eq!(engine.state(), EngineState::Offline);

    // Neither sync attempts nor foreground transitions move the state.
    let _ = engine.sync().await?;
    assert_eq!(engine.state(), EngineState::Offline);

    app_state.set_state(AppLifecycleState::Active);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.state(), EngineState::Offline);

    network.set_online(true);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(engine.state(), EngineState::Idle);

    engine.shutdown().await?;
    Ok(())
}

/// Expect network transitions to emit events and flip the state.
#[tokio::test]
async fn network_transitions_drive_state_and_events() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    let network = MockNetwork::new(true);
    let app_state = MockAppState::new();

    let engine = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await?;
    let (events, _subscription) = event_recorder(&engine);

    network.set_online(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.state(), EngineState::Offline);

    network.set_online(true);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(engine.state(), EngineState::Idle);

    let seen = events.lock().unwrap().clone();
    assert!(seen.contains(&"network_offline".to_string()));
    assert!(seen.contains(&"network_online".to_string()));

    engine.shutdown().await?;
    Ok(())
}

/// Expect re-initialization without shutdown to be rejected.
#[tokio::test]
async fn reinitialize_without_shutdown_is_an_error() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    let network = MockNetwork::new(true);
    let app_state = MockAppState::new();

    let engine = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await?;

    let second = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await;
    assert!(matches!(second, Err(Error::AlreadyInitialized)));

    engine.shutdown().await?;

    // After shutdown the singleton slot is free again.
    let engine = SyncEngine::initialize(
        test_config(),
        transport.clone(),
        network.clone(),
        app_state.clone(),
    )
    .await?;

    // Shutdown detaches the adapter listeners.
    assert_eq!(network.listener_count(), 1);
    engine.shutdown().await?;
    assert_eq!(network.listener_count(), 0);

    // A second shutdown is rejected.
    assert!(matches!(engine.shutdown().await, Err(Error::NotInitialized)));
    Ok(())
}

/// Expect the history ring to keep the most recent results, newest first.
#[tokio::test]
async fn history_is_bounded_newest_first() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    let network = MockNetwork::new(true);
    let app_state = MockAppState::new();

    let mut config = test_config();
    config.history_limit = 3;

    let engine =
        SyncEngine::initialize(config, transport.clone(), network.clone(), app_state.clone())
            .await?;

    for _ in 0..5 {
        engine
            .sync_with(SyncOptions {
                force: true,
                timeout: None,
            })
            .await?;
    }

    let history = engine.history();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.success));
    assert!(engine.last_result().is_some());

    engine.shutdown().await?;
    Ok(())
}

/// Expect a foreground transition to trigger a sync when one is due.
#[tokio::test]
async fn foreground_transition_triggers_auto_sync() -> Result<(), TestError> {
    let _guard = engine_lock().await;

    let transport = MockTransport::new();
    transport.stub_pulls(0);
    let network = MockNetwork::new(true);
    let app_state = MockAppState::new();

    let mut config = test_config();
    config.auto_sync_on_foreground = true;
    // Never synced yet, so the first foreground transition is always due.
    let engine =
        SyncEngine::initialize(config, transport.clone(), network.clone(), app_state.clone())
            .await?;

    app_state.set_state(AppLifecycleState::Active);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(transport.call_count("wallet_fetch"), 1);

    // A second transition right away is inside the throttle window.
    app_state.set_state(AppLifecycleState::Active);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.call_count("wallet_fetch"), 1);

    engine.shutdown().await?;
    Ok(())
}
