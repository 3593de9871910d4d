//! Operation model: the durable record describing a mutation intent.
//!
//! Operations are created by domain callers, persisted by the queue, and
//! dispatched to handlers. Constructors derive defaults from the operation
//! type: priority from a fixed table (financial operations are critical,
//! profile noise is low), the entity type from the type, and the retry limit
//! from the priority. Payload and metadata are serialized to byte strings so
//! the queue row stays schema-agnostic.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::util::id::{random_id, random_nonce};

/// Closed set of operation types the engine can enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    TransactionCreate,
    TransactionCancel,
    WalletUpdate,
    WalletTopup,
    WalletRefund,
    ProfileUpdate,
    PreferencesUpdate,
    TicketTransfer,
    TicketValidate,
    NfcLink,
    NfcUnlink,
    NfcPayment,
    FavoriteAdd,
    FavoriteRemove,
    FriendRequest,
    FriendAccept,
    FriendReject,
    LocationShare,
    NotificationRead,
    PushTokenRegister,
}

impl OperationType {
    /// Every operation type, in declaration order.
    pub const ALL: [OperationType; 20] = [
        OperationType::TransactionCreate,
        OperationType::TransactionCancel,
        OperationType::WalletUpdate,
        OperationType::WalletTopup,
        OperationType::WalletRefund,
        OperationType::ProfileUpdate,
        OperationType::PreferencesUpdate,
        OperationType::TicketTransfer,
        OperationType::TicketValidate,
        OperationType::NfcLink,
        OperationType::NfcUnlink,
        OperationType::NfcPayment,
        OperationType::FavoriteAdd,
        OperationType::FavoriteRemove,
        OperationType::FriendRequest,
        OperationType::FriendAccept,
        OperationType::FriendReject,
        OperationType::LocationShare,
        OperationType::NotificationRead,
        OperationType::PushTokenRegister,
    ];

    /// Stable wire/storage name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::TransactionCreate => "transaction_create",
            OperationType::TransactionCancel => "transaction_cancel",
            OperationType::WalletUpdate => "wallet_update",
            OperationType::WalletTopup => "wallet_topup",
            OperationType::WalletRefund => "wallet_refund",
            OperationType::ProfileUpdate => "profile_update",
            OperationType::PreferencesUpdate => "preferences_update",
            OperationType::TicketTransfer => "ticket_transfer",
            OperationType::TicketValidate => "ticket_validate",
            OperationType::NfcLink => "nfc_link",
            OperationType::NfcUnlink => "nfc_unlink",
            OperationType::NfcPayment => "nfc_payment",
            OperationType::FavoriteAdd => "favorite_add",
            OperationType::FavoriteRemove => "favorite_remove",
            OperationType::FriendRequest => "friend_request",
            OperationType::FriendAccept => "friend_accept",
            OperationType::FriendReject => "friend_reject",
            OperationType::LocationShare => "location_share",
            OperationType::NotificationRead => "notification_read",
            OperationType::PushTokenRegister => "push_token_register",
        }
    }

    /// Parses a stored type name back into the enum.
    pub fn parse(value: &str) -> Option<Self> {
        OperationType::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
    }

    /// Default priority for the type.
    ///
    /// Money movement is critical, reversals and ticket movement are high,
    /// ambient profile/social noise is low, everything else is normal.
    pub fn priority(&self) -> Priority {
        match self {
            OperationType::TransactionCreate
            | OperationType::WalletTopup
            | OperationType::NfcPayment => Priority::Critical,
            OperationType::TransactionCancel
            | OperationType::WalletRefund
            | OperationType::TicketTransfer
            | OperationType::TicketValidate
            | OperationType::NfcLink
            | OperationType::NfcUnlink => Priority::High,
            OperationType::PreferencesUpdate
            | OperationType::LocationShare
            | OperationType::NotificationRead
            | OperationType::PushTokenRegister => Priority::Low,
            OperationType::WalletUpdate
            | OperationType::ProfileUpdate
            | OperationType::FavoriteAdd
            | OperationType::FavoriteRemove
            | OperationType::FriendRequest
            | OperationType::FriendAccept
            | OperationType::FriendReject => Priority::Normal,
        }
    }

    /// Entity class the type targets; keys the conflict strategy table.
    pub fn entity_type(&self) -> &'static str {
        match self {
            OperationType::TransactionCreate
            | OperationType::TransactionCancel
            | OperationType::NfcPayment => "transaction",
            OperationType::WalletUpdate
            | OperationType::WalletTopup
            | OperationType::WalletRefund => "wallet",
            OperationType::ProfileUpdate => "user",
            OperationType::PreferencesUpdate => "user_preferences",
            OperationType::TicketTransfer | OperationType::TicketValidate => "ticket",
            OperationType::NfcLink | OperationType::NfcUnlink => "nfc_tag",
            OperationType::FavoriteAdd | OperationType::FavoriteRemove => "favorite",
            OperationType::FriendRequest
            | OperationType::FriendAccept
            | OperationType::FriendReject => "friend",
            OperationType::LocationShare => "location",
            OperationType::NotificationRead => "notification",
            OperationType::PushTokenRegister => "push_token",
        }
    }

    /// Default retry budget, derived from the priority.
    pub fn default_max_retries(&self) -> i32 {
        match self.priority() {
            Priority::Critical => 10,
            Priority::High => 7,
            Priority::Normal | Priority::Low => 5,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRUD verb the operation applies to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudOp {
    Create,
    Update,
    Delete,
}

impl CrudOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrudOp::Create => "create",
            CrudOp::Update => "update",
            CrudOp::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(CrudOp::Create),
            "update" => Some(CrudOp::Update),
            "delete" => Some(CrudOp::Delete),
            _ => None,
        }
    }
}

/// Queue priority. Lower values dequeue first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Integer representation stored in the row and used by the dequeue index.
    pub fn as_i32(&self) -> i32 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Priority::Critical),
            1 => Some(Priority::High),
            2 => Some(Priority::Normal),
            3 => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// Operation lifecycle status.
///
/// Transitions are monotonic except via an explicit retry reset:
/// pending -> in_progress -> {completed, pending (retry), failed};
/// cancelled is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OperationStatus::Pending),
            "in_progress" => Some(OperationStatus::InProgress),
            "completed" => Some(OperationStatus::Completed),
            "failed" => Some(OperationStatus::Failed),
            "cancelled" => Some(OperationStatus::Cancelled),
            _ => None,
        }
    }
}

/// Context attached to every operation.
///
/// The signature, when present, is opaque bytes produced by the caller; the
/// engine never signs payloads itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetadata {
    pub device_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub festival_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

/// A durable mutation intent, as stored in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: String,
    pub op_type: OperationType,
    pub crud_op: CrudOp,
    pub entity_type: String,
    pub entity_id: String,
    pub priority: Priority,
    pub status: OperationStatus,
    pub payload: Value,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub metadata: OperationMetadata,
}

impl Operation {
    /// True when the row's retry budget is exhausted.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Serializes the payload for storage.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(&self.payload)?)
    }

    /// Serializes the metadata for storage.
    pub fn metadata_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(&self.metadata)?)
    }
}

impl TryFrom<entity::sync_operation::Model> for Operation {
    type Error = Error;

    fn try_from(model: entity::sync_operation::Model) -> Result<Self, Error> {
        let op_type = OperationType::parse(&model.op_type).ok_or_else(|| {
            Error::InternalError(format!("unknown operation type in store: {}", model.op_type))
        })?;
        let crud_op = CrudOp::parse(&model.crud_op).ok_or_else(|| {
            Error::InternalError(format!("unknown crud op in store: {}", model.crud_op))
        })?;
        let priority = Priority::from_i32(model.priority).ok_or_else(|| {
            Error::InternalError(format!("unknown priority in store: {}", model.priority))
        })?;
        let status = OperationStatus::parse(&model.status).ok_or_else(|| {
            Error::InternalError(format!("unknown status in store: {}", model.status))
        })?;

        Ok(Operation {
            id: model.id,
            op_type,
            crud_op,
            entity_type: model.entity_type,
            entity_id: model.entity_id,
            priority,
            status,
            payload: serde_json::from_slice(&model.payload)?,
            idempotency_key: model.idempotency_key,
            created_at: model.created_at,
            updated_at: model.updated_at,
            retry_count: model.retry_count,
            max_retries: model.max_retries,
            last_retry_at: model.last_retry_at,
            next_retry_at: model.next_retry_at,
            error: model.error,
            error_code: model.error_code,
            metadata: serde_json::from_slice(&model.metadata)?,
        })
    }
}

/// Condensed representation for logs: large payloads are elided.
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}:{}, {}, {})",
            self.op_type.as_str(),
            self.id,
            self.entity_type,
            self.entity_id,
            self.priority.as_str(),
            self.status.as_str(),
        )
    }
}

/// Input for enqueuing an operation; defaults are derived from the type.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub op_type: OperationType,
    pub crud_op: CrudOp,
    pub entity_id: String,
    pub payload: Value,
    pub metadata: OperationMetadata,
    /// Overrides the type-derived priority.
    pub priority: Option<Priority>,
    /// Overrides the type-derived retry budget.
    pub max_retries: Option<i32>,
    /// Overrides the derived idempotency key. Must be non-empty.
    pub idempotency_key: Option<String>,
}

impl NewOperation {
    pub fn new(
        op_type: OperationType,
        crud_op: CrudOp,
        entity_id: impl Into<String>,
        payload: Value,
        metadata: OperationMetadata,
    ) -> Self {
        Self {
            op_type,
            crud_op,
            entity_id: entity_id.into(),
            payload,
            metadata,
            priority: None,
            max_retries: None,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Materializes the pending operation, filling type-derived defaults.
    pub fn into_operation(self, now: DateTime<Utc>) -> Operation {
        let priority = self.priority.unwrap_or_else(|| self.op_type.priority());
        let max_retries = self
            .max_retries
            .unwrap_or_else(|| self.op_type.default_max_retries());
        let idempotency_key = match self.idempotency_key {
            Some(key) if !key.is_empty() => key,
            _ => derive_idempotency_key(self.op_type, &self.entity_id, &self.metadata.user_id, now),
        };

        Operation {
            id: random_id("op"),
            op_type: self.op_type,
            crud_op: self.crud_op,
            entity_type: self.op_type.entity_type().to_string(),
            entity_id: self.entity_id,
            priority,
            status: OperationStatus::Pending,
            payload: self.payload,
            idempotency_key,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            max_retries,
            last_retry_at: None,
            next_retry_at: None,
            error: None,
            error_code: None,
            metadata: self.metadata,
        }
    }
}

/// Derives an idempotency key from `(type, entity, user, timestamp, nonce)`.
///
/// The nonce keeps two logically distinct requests created in the same
/// millisecond apart; the server deduplicates on the full string.
pub fn derive_idempotency_key(
    op_type: OperationType,
    entity_id: &str,
    user_id: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        op_type.as_str(),
        entity_id,
        user_id,
        at.timestamp_millis(),
        random_nonce(),
    )
}

/// Partial update applied to a stored operation.
///
/// Outer `None` leaves the column untouched; for nullable columns the inner
/// `Option` distinguishes "set to NULL" from "leave alone".
#[derive(Debug, Clone, Default)]
pub struct OperationUpdate {
    pub status: Option<OperationStatus>,
    pub retry_count: Option<i32>,
    pub last_retry_at: Option<Option<DateTime<Utc>>>,
    pub next_retry_at: Option<Option<DateTime<Utc>>>,
    pub error: Option<Option<String>>,
    pub error_code: Option<Option<String>>,
}

impl OperationUpdate {
    pub fn status(status: OperationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
