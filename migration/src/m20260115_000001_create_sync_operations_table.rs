use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

static IDX_IDEMPOTENCY_KEY: &str = "idx_sync_operations_idempotency_key";
static IDX_STATUS: &str = "idx_sync_operations_status";
static IDX_PRIORITY: &str = "idx_sync_operations_priority";
static IDX_NEXT_RETRY_AT: &str = "idx_sync_operations_next_retry_at";
static IDX_OP_TYPE: &str = "idx_sync_operations_op_type";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // op_type, crud_op, and status are stored as strings; SQLite has no
        // native enum type and the engine validates values at the model layer.
        manager
            .create_table(
                Table::create()
                    .table(SyncOperations::Table)
                    .if_not_exists()
                    .col(string(SyncOperations::Id).primary_key())
                    .col(string(SyncOperations::OpType))
                    .col(string(SyncOperations::CrudOp))
                    .col(string(SyncOperations::EntityType))
                    .col(string(SyncOperations::EntityId))
                    .col(integer(SyncOperations::Priority))
                    .col(string(SyncOperations::Status).default("pending"))
                    .col(blob(SyncOperations::Payload))
                    .col(string(SyncOperations::IdempotencyKey))
                    .col(timestamp_with_time_zone(SyncOperations::CreatedAt))
                    .col(timestamp_with_time_zone(SyncOperations::UpdatedAt))
                    .col(integer(SyncOperations::RetryCount).default(0))
                    .col(integer(SyncOperations::MaxRetries))
                    .col(timestamp_with_time_zone_null(SyncOperations::LastRetryAt))
                    .col(timestamp_with_time_zone_null(SyncOperations::NextRetryAt))
                    .col(string_null(SyncOperations::Error))
                    .col(string_null(SyncOperations::ErrorCode))
                    .col(blob(SyncOperations::Metadata))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(IDX_IDEMPOTENCY_KEY)
                    .table(SyncOperations::Table)
                    .col(SyncOperations::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(IDX_STATUS)
                    .table(SyncOperations::Table)
                    .col(SyncOperations::Status)
                    .to_owned(),
            )
            .await?;

        // Composite index serving the ready-operation dequeue query, which
        // orders by (priority, created_at) among pending rows.
        manager
            .create_index(
                Index::create()
                    .name(IDX_PRIORITY)
                    .table(SyncOperations::Table)
                    .col(SyncOperations::Priority)
                    .col(SyncOperations::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(IDX_NEXT_RETRY_AT)
                    .table(SyncOperations::Table)
                    .col(SyncOperations::NextRetryAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(IDX_OP_TYPE)
                    .table(SyncOperations::Table)
                    .col(SyncOperations::OpType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_OP_TYPE)
                    .table(SyncOperations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name(IDX_NEXT_RETRY_AT)
                    .table(SyncOperations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name(IDX_PRIORITY)
                    .table(SyncOperations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name(IDX_STATUS)
                    .table(SyncOperations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name(IDX_IDEMPOTENCY_KEY)
                    .table(SyncOperations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncOperations::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum SyncOperations {
    Table,
    Id,
    OpType,
    CrudOp,
    EntityType,
    EntityId,
    Priority,
    Status,
    Payload,
    IdempotencyKey,
    CreatedAt,
    UpdatedAt,
    RetryCount,
    MaxRetries,
    LastRetryAt,
    NextRetryAt,
    Error,
    ErrorCode,
    Metadata,
}
