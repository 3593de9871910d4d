//! Repository over the `sync_operations` and `sync_kv` tables.
//!
//! All queue writes flow through this layer; no other component touches the
//! store. Rows are converted to and from the domain [`Operation`] at the
//! boundary so callers never see sea-orm models.

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue, ColumnTrait, Condition, DatabaseConnection,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

use entity::sync_operation::{ActiveModel, Column, Entity as SyncOperation};

use crate::error::Error;
use crate::model::operation::{
    Operation, OperationStatus, OperationType, OperationUpdate, Priority,
};
use crate::model::result::QueueStats;
use crate::util::id::random_id;

/// Filters for the read side of the queue.
#[derive(Debug, Clone, Default)]
pub struct OperationFilter {
    pub status: Option<OperationStatus>,
    pub op_type: Option<OperationType>,
    pub priority: Option<Priority>,
    pub entity_type: Option<String>,
    pub limit: Option<u64>,
}

pub struct OperationRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> OperationRepository<'a> {
    /// Creates a new instance of [`OperationRepository`]
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a fully materialized operation.
    pub async fn insert(&self, operation: &Operation) -> Result<Operation, Error> {
        let model = ActiveModel {
            id: ActiveValue::Set(operation.id.clone()),
            op_type: ActiveValue::Set(operation.op_type.as_str().to_string()),
            crud_op: ActiveValue::Set(operation.crud_op.as_str().to_string()),
            entity_type: ActiveValue::Set(operation.entity_type.clone()),
            entity_id: ActiveValue::Set(operation.entity_id.clone()),
            priority: ActiveValue::Set(operation.priority.as_i32()),
            status: ActiveValue::Set(operation.status.as_str().to_string()),
            payload: ActiveValue::Set(operation.payload_bytes()?),
            idempotency_key: ActiveValue::Set(operation.idempotency_key.clone()),
            created_at: ActiveValue::Set(operation.created_at),
            updated_at: ActiveValue::Set(operation.updated_at),
            retry_count: ActiveValue::Set(operation.retry_count),
            max_retries: ActiveValue::Set(operation.max_retries),
            last_retry_at: ActiveValue::Set(operation.last_retry_at),
            next_retry_at: ActiveValue::Set(operation.next_retry_at),
            error: ActiveValue::Set(operation.error.clone()),
            error_code: ActiveValue::Set(operation.error_code.clone()),
            metadata: ActiveValue::Set(operation.metadata_bytes()?),
        };

        let inserted = model.insert(self.db).await?;
        Operation::try_from(inserted)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Operation>, Error> {
        let model = SyncOperation::find_by_id(id).one(self.db).await?;
        model.map(Operation::try_from).transpose()
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Operation>, Error> {
        let model = SyncOperation::find()
            .filter(Column::IdempotencyKey.eq(key))
            .one(self.db)
            .await?;
        model.map(Operation::try_from).transpose()
    }

    /// Filtered listing, newest first.
    pub async fn list(&self, filter: OperationFilter) -> Result<Vec<Operation>, Error> {
        let mut query = SyncOperation::find();

        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }
        if let Some(op_type) = filter.op_type {
            query = query.filter(Column::OpType.eq(op_type.as_str()));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(Column::Priority.eq(priority.as_i32()));
        }
        if let Some(entity_type) = &filter.entity_type {
            query = query.filter(Column::EntityType.eq(entity_type));
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        let models = query
            .order_by_desc(Column::CreatedAt)
            .all(self.db)
            .await?;

        models.into_iter().map(Operation::try_from).collect()
    }

    /// Ready rows: pending with no scheduled retry or a due one, ordered by
    /// `(priority, created_at)`.
    ///
    /// Ordering is FIFO within a priority band only; per-entity ordering
    /// across different priorities is not guaranteed.
    pub async fn pending_ready(
        &self,
        now: DateTime<Utc>,
        entity_type: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Vec<Operation>, Error> {
        let mut query = SyncOperation::find().filter(
            Condition::all()
                .add(Column::Status.eq(OperationStatus::Pending.as_str()))
                .add(
                    Condition::any()
                        .add(Column::NextRetryAt.is_null())
                        .add(Column::NextRetryAt.lte(now)),
                ),
        );

        if let Some(entity_type) = entity_type {
            query = query.filter(Column::EntityType.eq(entity_type));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let models = query
            .order_by_asc(Column::Priority)
            .order_by_asc(Column::CreatedAt)
            .all(self.db)
            .await?;

        models.into_iter().map(Operation::try_from).collect()
    }

    /// Applies a partial update, bumping `updated_at`.
    pub async fn update(
        &self,
        id: &str,
        update: OperationUpdate,
    ) -> Result<Option<Operation>, Error> {
        let model = match SyncOperation::find_by_id(id).one(self.db).await? {
            Some(model) => model,
            None => return Ok(None),
        };

        let mut active = model.into_active_model();
        if let Some(status) = update.status {
            active.status = ActiveValue::Set(status.as_str().to_string());
        }
        if let Some(retry_count) = update.retry_count {
            active.retry_count = ActiveValue::Set(retry_count);
        }
        if let Some(last_retry_at) = update.last_retry_at {
            active.last_retry_at = ActiveValue::Set(last_retry_at);
        }
        if let Some(next_retry_at) = update.next_retry_at {
            active.next_retry_at = ActiveValue::Set(next_retry_at);
        }
        if let Some(error) = update.error {
            active.error = ActiveValue::Set(error);
        }
        if let Some(error_code) = update.error_code {
            active.error_code = ActiveValue::Set(error_code);
        }
        active.updated_at = ActiveValue::Set(Utc::now());

        let updated = active.update(self.db).await?;
        Ok(Some(Operation::try_from(updated)?))
    }

    /// Deletes one row; returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, Error> {
        let result = SyncOperation::delete_by_id(id).exec(self.db).await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn clear(&self) -> Result<u64, Error> {
        let result = SyncOperation::delete_many().exec(self.db).await?;
        Ok(result.rows_affected)
    }

    /// Removes completed rows whose last update is older than the cutoff.
    pub async fn cleanup_completed(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let result = SyncOperation::delete_many()
            .filter(
                Condition::all()
                    .add(Column::Status.eq(OperationStatus::Completed.as_str()))
                    .add(Column::UpdatedAt.lt(cutoff)),
            )
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Returns rows stranded in `in_progress` to pending.
    ///
    /// Processing marks a row `in_progress` before invoking its handler; a
    /// crash or an aborted (timed-out) run can leave it there. Called when
    /// the processing loop starts so those rows get another attempt.
    pub async fn requeue_in_progress(&self) -> Result<u64, Error> {
        let result = SyncOperation::update_many()
            .col_expr(
                Column::Status,
                Expr::value(OperationStatus::Pending.as_str()),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Status.eq(OperationStatus::InProgress.as_str()))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Resets one failed row back to pending with a fresh retry budget.
    pub async fn retry(&self, id: &str) -> Result<Operation, Error> {
        let operation = self
            .get(id)
            .await?
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;

        if operation.status != OperationStatus::Failed {
            return Err(Error::InvalidRetry(id.to_string()));
        }

        let update = OperationUpdate {
            status: Some(OperationStatus::Pending),
            retry_count: Some(0),
            last_retry_at: Some(None),
            next_retry_at: Some(None),
            error: Some(None),
            error_code: Some(None),
        };

        self.update(id, update)
            .await?
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))
    }

    /// Resets every failed row back to pending; returns how many.
    pub async fn retry_all_failed(&self) -> Result<u64, Error> {
        let failed = self
            .list(OperationFilter {
                status: Some(OperationStatus::Failed),
                ..Default::default()
            })
            .await?;

        let count = failed.len() as u64;
        for operation in failed {
            self.retry(&operation.id).await?;
        }

        Ok(count)
    }

    pub async fn count_pending_for_entity(&self, entity_type: &str) -> Result<u64, Error> {
        let count = SyncOperation::find()
            .filter(
                Condition::all()
                    .add(Column::Status.eq(OperationStatus::Pending.as_str()))
                    .add(Column::EntityType.eq(entity_type)),
            )
            .count(self.db)
            .await?;
        Ok(count)
    }

    /// Aggregated counters for UI badges and diagnostics.
    pub async fn stats(&self) -> Result<QueueStats, Error> {
        let mut stats = QueueStats::default();

        let by_status: Vec<(String, i64)> = SyncOperation::find()
            .select_only()
            .column(Column::Status)
            .column_as(Column::Id.count(), "count")
            .group_by(Column::Status)
            .into_tuple()
            .all(self.db)
            .await?;
        for (status, count) in by_status {
            stats.total += count as u64;
            stats.by_status.insert(status, count as u64);
        }

        let pending_by_priority: Vec<(i32, i64)> = SyncOperation::find()
            .select_only()
            .column(Column::Priority)
            .column_as(Column::Id.count(), "count")
            .filter(Column::Status.eq(OperationStatus::Pending.as_str()))
            .group_by(Column::Priority)
            .into_tuple()
            .all(self.db)
            .await?;
        for (priority, count) in pending_by_priority {
            let name = Priority::from_i32(priority)
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| priority.to_string());
            stats.pending_by_priority.insert(name, count as u64);
        }

        let by_type: Vec<(String, i64)> = SyncOperation::find()
            .select_only()
            .column(Column::OpType)
            .column_as(Column::Id.count(), "count")
            .group_by(Column::OpType)
            .into_tuple()
            .all(self.db)
            .await?;
        for (op_type, count) in by_type {
            stats.by_type.insert(op_type, count as u64);
        }

        stats.oldest_pending_at = SyncOperation::find()
            .filter(Column::Status.eq(OperationStatus::Pending.as_str()))
            .order_by_asc(Column::CreatedAt)
            .one(self.db)
            .await?
            .map(|m| m.created_at);

        stats.last_completed_at = SyncOperation::find()
            .filter(Column::Status.eq(OperationStatus::Completed.as_str()))
            .order_by_desc(Column::UpdatedAt)
            .one(self.db)
            .await?
            .map(|m| m.updated_at);

        Ok(stats)
    }
}

/// Well-known key for the device id slot.
pub const DEVICE_ID_KEY: &str = "@sync_queue_device_id";

pub struct KvRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> KvRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the stable device id, provisioning one on first use.
    pub async fn device_id(&self) -> Result<String, Error> {
        use entity::sync_kv::{ActiveModel, Entity as SyncKv};

        if let Some(slot) = SyncKv::find_by_id(DEVICE_ID_KEY).one(self.db).await? {
            return Ok(slot.value);
        }

        let device_id = random_id("device");
        let slot = ActiveModel {
            key: ActiveValue::Set(DEVICE_ID_KEY.to_string()),
            value: ActiveValue::Set(device_id.clone()),
            updated_at: ActiveValue::Set(Utc::now()),
        };
        slot.insert(self.db).await?;

        Ok(device_id)
    }
}
