//! Factory functions for operations and domain fixtures.
//!
//! Factories only build data objects; persisting them (via `engine.enqueue`
//! or `queue.add`) is the test's responsibility.

use chrono::Utc;
use serde_json::json;

use muninn::model::operation::{CrudOp, NewOperation, OperationMetadata, OperationType};
use muninn::store::PendingTransaction;

use crate::constant::{TEST_DEVICE_ID, TEST_FESTIVAL_ID, TEST_USER_ID};

/// Standard fixture metadata.
pub fn metadata() -> OperationMetadata {
    OperationMetadata {
        device_id: TEST_DEVICE_ID.to_string(),
        user_id: TEST_USER_ID.to_string(),
        festival_id: Some(TEST_FESTIVAL_ID.to_string()),
        ..Default::default()
    }
}

/// A `transaction_create` carrying the domain idempotency key in its
/// payload, the way the purchase flow enqueues it.
///
/// The queue-row idempotency key is left to derivation, so two calls with
/// the same domain key still store two rows.
pub fn transaction_create(entity_id: &str, amount_cents: i64, domain_key: &str) -> NewOperation {
    NewOperation::new(
        OperationType::TransactionCreate,
        CrudOp::Create,
        entity_id,
        json!({
            "amount": amount_cents,
            "idempotency_key": domain_key,
            "created_at": Utc::now().to_rfc3339(),
        }),
        metadata(),
    )
}

/// A `wallet_topup` for the given amount.
pub fn wallet_topup(entity_id: &str, amount_cents: i64) -> NewOperation {
    NewOperation::new(
        OperationType::WalletTopup,
        CrudOp::Update,
        entity_id,
        json!({"amount": amount_cents}),
        metadata(),
    )
}

/// A low-priority `preferences_update`.
pub fn preferences_update(entity_id: &str) -> NewOperation {
    NewOperation::new(
        OperationType::PreferencesUpdate,
        CrudOp::Update,
        entity_id,
        json!({"language": "de", "notifications": true}),
        metadata(),
    )
}

/// A pending domain transaction mirroring an enqueued push.
pub fn pending_transaction(id: &str, amount_cents: i64, domain_key: &str) -> PendingTransaction {
    PendingTransaction {
        id: id.to_string(),
        idempotency_key: domain_key.to_string(),
        amount_cents,
        stand_id: None,
        created_at: Utc::now(),
        retry_count: 0,
        last_error: None,
    }
}
