//! Row model for the persistent operation queue.
//!
//! `op_type`, `crud_op`, and `status` are stored as plain strings rather than
//! database enums so the SQLite schema stays stable as operation types are
//! added; the engine's model layer owns the conversion to typed enums.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_operations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub op_type: String,
    pub crud_op: String,
    pub entity_type: String,
    pub entity_id: String,
    pub priority: i32,
    pub status: String,
    #[sea_orm(column_type = "Blob")]
    pub payload: Vec<u8>,
    #[sea_orm(unique)]
    pub idempotency_key: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub retry_count: i32,
    pub max_retries: i32,
    pub last_retry_at: Option<DateTimeUtc>,
    pub next_retry_at: Option<DateTimeUtc>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    #[sea_orm(column_type = "Blob")]
    pub metadata: Vec<u8>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
