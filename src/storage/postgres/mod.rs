//! PostgreSQL storage backend.
//!
//! Production backend. Ids are TEXT UUIDs (parsed at the boundary),
//! timestamps are `timestamptz`, payloads are `jsonb`. Status transitions
//! use the same conditional-UPDATE contract as the SQLite backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{
    Asterisk, ColumnDef, Cond, Expr, Index, Order, PostgresQueryBuilder, Query, Table,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::model::{
    Credential, DeliveryReceipt, DeliveryStatus, NewOutboxEvent, OutboxEvent, PublishStatus,
    ReceiptOutcome, RoutingName, Tenant,
};
use crate::storage::schema::{
    DeliveryReceipts, OutboxEvents, TenantCredentials, Tenants,
    CREATE_ONE_ACTIVE_CREDENTIAL_INDEX,
};
use crate::storage::{fmt_ts, HealthCounts, OutboxStore, Result, RetryFilter, TenantDirectory};

/// PostgreSQL implementation of the outbox store and tenant directory.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize the schema.
    pub async fn init(&self) -> Result<()> {
        let create_events = Table::create()
            .table(OutboxEvents::Table)
            .if_not_exists()
            .col(ColumnDef::new(OutboxEvents::EventId).text().primary_key())
            .col(ColumnDef::new(OutboxEvents::EntityId).text().not_null())
            .col(ColumnDef::new(OutboxEvents::TenantId).text().not_null())
            .col(ColumnDef::new(OutboxEvents::EventType).text().not_null())
            .col(ColumnDef::new(OutboxEvents::Origin).text().not_null())
            .col(
                ColumnDef::new(OutboxEvents::Payload)
                    .json_binary()
                    .not_null(),
            )
            .col(
                ColumnDef::new(OutboxEvents::Metadata)
                    .json_binary()
                    .not_null(),
            )
            .col(
                ColumnDef::new(OutboxEvents::PublishStatus)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(OutboxEvents::PublishedAt).timestamp_with_time_zone())
            .col(
                ColumnDef::new(OutboxEvents::PublishAttempts)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(OutboxEvents::PublishFirstAttemptAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(
                ColumnDef::new(OutboxEvents::PublishLastAttemptAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(ColumnDef::new(OutboxEvents::PublishFailureReason).text())
            .col(
                ColumnDef::new(OutboxEvents::DeliveryStatus)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(OutboxEvents::DeliveredAt).timestamp_with_time_zone())
            .col(
                ColumnDef::new(OutboxEvents::DeliveryAttempts)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(ColumnDef::new(OutboxEvents::DeliveryLastAttemptAt).timestamp_with_time_zone())
            .col(ColumnDef::new(OutboxEvents::DeliveryFailureReason).text())
            .col(
                ColumnDef::new(OutboxEvents::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .to_string(PostgresQueryBuilder);

        let create_tenants = Table::create()
            .table(Tenants::Table)
            .if_not_exists()
            .col(ColumnDef::new(Tenants::TenantId).text().primary_key())
            .col(
                ColumnDef::new(Tenants::RoutingName)
                    .text()
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(Tenants::Status).text().not_null())
            .col(
                ColumnDef::new(Tenants::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(
                ColumnDef::new(Tenants::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .to_string(PostgresQueryBuilder);

        let create_credentials = Table::create()
            .table(TenantCredentials::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(TenantCredentials::CredentialId)
                    .text()
                    .primary_key(),
            )
            .col(
                ColumnDef::new(TenantCredentials::TenantId)
                    .text()
                    .not_null(),
            )
            .col(
                ColumnDef::new(TenantCredentials::SecretHash)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(TenantCredentials::Status).text().not_null())
            .col(ColumnDef::new(TenantCredentials::ExpiresAt).timestamp_with_time_zone())
            .col(ColumnDef::new(TenantCredentials::LastUsedAt).timestamp_with_time_zone())
            .col(
                ColumnDef::new(TenantCredentials::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .to_string(PostgresQueryBuilder);

        let create_receipts = Table::create()
            .table(DeliveryReceipts::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(DeliveryReceipts::ReceiptId)
                    .text()
                    .primary_key(),
            )
            .col(ColumnDef::new(DeliveryReceipts::EventId).text().not_null())
            .col(ColumnDef::new(DeliveryReceipts::TenantId).text().not_null())
            .col(
                ColumnDef::new(DeliveryReceipts::EventType)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(DeliveryReceipts::Outcome).text().not_null())
            .col(ColumnDef::new(DeliveryReceipts::FailureReason).text())
            .col(
                ColumnDef::new(DeliveryReceipts::ReceivedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(
                ColumnDef::new(DeliveryReceipts::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .to_string(PostgresQueryBuilder);

        for ddl in [
            create_events,
            create_tenants,
            create_credentials,
            create_receipts,
        ] {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }

        let idx_publish = Index::create()
            .if_not_exists()
            .name("idx_outbox_publish_status")
            .table(OutboxEvents::Table)
            .col(OutboxEvents::PublishStatus)
            .col(OutboxEvents::CreatedAt)
            .to_string(PostgresQueryBuilder);

        let idx_delivery = Index::create()
            .if_not_exists()
            .name("idx_outbox_delivery_status")
            .table(OutboxEvents::Table)
            .col(OutboxEvents::PublishStatus)
            .col(OutboxEvents::DeliveryStatus)
            .col(OutboxEvents::CreatedAt)
            .to_string(PostgresQueryBuilder);

        let idx_receipts = Index::create()
            .if_not_exists()
            .name("idx_receipts_event_tenant")
            .table(DeliveryReceipts::Table)
            .col(DeliveryReceipts::EventId)
            .col(DeliveryReceipts::TenantId)
            .to_string(PostgresQueryBuilder);

        for ddl in [idx_publish, idx_delivery, idx_receipts] {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }

        sqlx::query(CREATE_ONE_ACTIVE_CREDENTIAL_INDEX)
            .execute(&self.pool)
            .await?;

        info!("Outbox schema initialized (PostgreSQL)");
        Ok(())
    }

    fn row_to_event(row: &PgRow) -> Result<OutboxEvent> {
        let event_id: String = row.get("event_id");
        let entity_id: String = row.get("entity_id");
        let tenant_id: String = row.get("tenant_id");
        let event_type: String = row.get("event_type");
        let publish_status: String = row.get("publish_status");
        let delivery_status: String = row.get("delivery_status");

        Ok(OutboxEvent {
            event_id: Uuid::parse_str(&event_id)?,
            entity_id: Uuid::parse_str(&entity_id)?,
            tenant_id: Uuid::parse_str(&tenant_id)?,
            event_type: event_type.parse()?,
            origin: row.get("origin"),
            payload: row.get("payload"),
            metadata: row.get("metadata"),
            publish_status: publish_status.parse()?,
            published_at: row.get::<Option<DateTime<Utc>>, _>("published_at"),
            publish_attempts: row.get("publish_attempts"),
            publish_first_attempt_at: row.get("publish_first_attempt_at"),
            publish_last_attempt_at: row.get("publish_last_attempt_at"),
            publish_failure_reason: row.get("publish_failure_reason"),
            delivery_status: delivery_status.parse()?,
            delivered_at: row.get::<Option<DateTime<Utc>>, _>("delivered_at"),
            delivery_attempts: row.get("delivery_attempts"),
            delivery_last_attempt_at: row.get::<Option<DateTime<Utc>>, _>(
                "delivery_last_attempt_at",
            ),
            delivery_failure_reason: row.get("delivery_failure_reason"),
            created_at: row.get("created_at"),
        })
    }

    fn row_to_receipt(row: &PgRow) -> Result<DeliveryReceipt> {
        let receipt_id: String = row.get("receipt_id");
        let event_id: String = row.get("event_id");
        let tenant_id: String = row.get("tenant_id");
        let event_type: String = row.get("event_type");
        let outcome: String = row.get("outcome");

        Ok(DeliveryReceipt {
            receipt_id: Uuid::parse_str(&receipt_id)?,
            event_id: Uuid::parse_str(&event_id)?,
            tenant_id: Uuid::parse_str(&tenant_id)?,
            event_type: event_type.parse()?,
            outcome: outcome.parse()?,
            failure_reason: row.get("failure_reason"),
            received_at: row.get("received_at"),
            created_at: row.get("created_at"),
        })
    }

    fn row_to_tenant(row: &PgRow) -> Result<Tenant> {
        let tenant_id: String = row.get("tenant_id");
        let routing_name: String = row.get("routing_name");
        let status: String = row.get("status");

        Ok(Tenant {
            tenant_id: Uuid::parse_str(&tenant_id)?,
            routing_name: RoutingName::new(routing_name)?,
            status: status.parse()?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_credential(row: &PgRow) -> Result<Credential> {
        let credential_id: String = row.get("credential_id");
        let tenant_id: String = row.get("tenant_id");
        let status: String = row.get("status");

        Ok(Credential {
            credential_id: Uuid::parse_str(&credential_id)?,
            tenant_id: Uuid::parse_str(&tenant_id)?,
            secret_hash: row.get("secret_hash"),
            status: status.parse()?,
            expires_at: row.get::<Option<DateTime<Utc>>, _>("expires_at"),
            last_used_at: row.get::<Option<DateTime<Utc>>, _>("last_used_at"),
            created_at: row.get("created_at"),
        })
    }

    fn candidate_query(
        filter: &RetryFilter,
        publish_status: PublishStatus,
        delivery_side: bool,
    ) -> String {
        let cutoff = fmt_ts(Utc::now() - chrono::Duration::days(filter.lookback_days));
        let attempts_col = if delivery_side {
            OutboxEvents::DeliveryAttempts
        } else {
            OutboxEvents::PublishAttempts
        };

        let mut query = Query::select();
        query
            .column(Asterisk)
            .from(OutboxEvents::Table)
            .and_where(Expr::col(OutboxEvents::PublishStatus).eq(publish_status.to_string()))
            .and_where(Expr::col(OutboxEvents::CreatedAt).gte(cutoff))
            .and_where(Expr::col(attempts_col).lt(filter.max_attempts))
            .order_by(OutboxEvents::CreatedAt, Order::Asc)
            .limit(filter.batch_limit);

        if delivery_side {
            query.and_where(
                Expr::col(OutboxEvents::DeliveryStatus).ne(DeliveryStatus::Delivered.to_string()),
            );
        }
        if let Some(types) = &filter.event_types {
            query.and_where(
                Expr::col(OutboxEvents::EventType).is_in(types.iter().map(|t| t.to_string())),
            );
        }
        if let Some(tenant_id) = filter.tenant_id {
            query.and_where(Expr::col(OutboxEvents::TenantId).eq(tenant_id.to_string()));
        }

        query.to_string(PostgresQueryBuilder)
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn create_event(&self, event: &NewOutboxEvent) -> Result<OutboxEvent> {
        let now = Utc::now();
        let now_str = fmt_ts(now);

        let insert = Query::insert()
            .into_table(OutboxEvents::Table)
            .columns([
                OutboxEvents::EventId,
                OutboxEvents::EntityId,
                OutboxEvents::TenantId,
                OutboxEvents::EventType,
                OutboxEvents::Origin,
                OutboxEvents::Payload,
                OutboxEvents::Metadata,
                OutboxEvents::PublishStatus,
                OutboxEvents::PublishAttempts,
                OutboxEvents::PublishFirstAttemptAt,
                OutboxEvents::PublishLastAttemptAt,
                OutboxEvents::DeliveryStatus,
                OutboxEvents::DeliveryAttempts,
                OutboxEvents::CreatedAt,
            ])
            .values_panic([
                event.event_id.to_string().into(),
                event.entity_id.to_string().into(),
                event.tenant_id.to_string().into(),
                event.event_type.to_string().into(),
                event.origin.clone().into(),
                serde_json::to_string(&event.payload)?.into(),
                serde_json::to_string(&event.metadata)?.into(),
                PublishStatus::Pending.to_string().into(),
                1.into(),
                now_str.clone().into(),
                now_str.clone().into(),
                DeliveryStatus::Pending.to_string().into(),
                0.into(),
                now_str.into(),
            ])
            .to_string(PostgresQueryBuilder);

        sqlx::query(&insert).execute(&self.pool).await?;

        Ok(OutboxEvent {
            event_id: event.event_id,
            entity_id: event.entity_id,
            tenant_id: event.tenant_id,
            event_type: event.event_type,
            origin: event.origin.clone(),
            payload: event.payload.clone(),
            metadata: event.metadata.clone(),
            publish_status: PublishStatus::Pending,
            published_at: None,
            publish_attempts: 1,
            publish_first_attempt_at: now,
            publish_last_attempt_at: now,
            publish_failure_reason: None,
            delivery_status: DeliveryStatus::Pending,
            delivered_at: None,
            delivery_attempts: 0,
            delivery_last_attempt_at: None,
            delivery_failure_reason: None,
            created_at: now,
        })
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<OutboxEvent>> {
        let select = Query::select()
            .column(Asterisk)
            .from(OutboxEvents::Table)
            .and_where(Expr::col(OutboxEvents::EventId).eq(event_id.to_string()))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&select).fetch_optional(&self.pool).await?;
        row.map(|r| Self::row_to_event(&r)).transpose()
    }

    async fn mark_published(&self, event_id: Uuid) -> Result<bool> {
        let update = Query::update()
            .table(OutboxEvents::Table)
            .value(
                OutboxEvents::PublishStatus,
                PublishStatus::Published.to_string(),
            )
            .value(OutboxEvents::PublishedAt, fmt_ts(Utc::now()))
            .value(OutboxEvents::PublishFailureReason, Option::<String>::None)
            .and_where(Expr::col(OutboxEvents::EventId).eq(event_id.to_string()))
            .and_where(
                Expr::col(OutboxEvents::PublishStatus).eq(PublishStatus::Pending.to_string()),
            )
            .to_string(PostgresQueryBuilder);

        let result = sqlx::query(&update).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_publish_failure(&self, event_id: Uuid, reason: &str) -> Result<()> {
        let update = Query::update()
            .table(OutboxEvents::Table)
            .value(OutboxEvents::PublishFailureReason, reason)
            .value(OutboxEvents::PublishLastAttemptAt, fmt_ts(Utc::now()))
            .and_where(Expr::col(OutboxEvents::EventId).eq(event_id.to_string()))
            .and_where(
                Expr::col(OutboxEvents::PublishStatus).eq(PublishStatus::Pending.to_string()),
            )
            .to_string(PostgresQueryBuilder);

        sqlx::query(&update).execute(&self.pool).await?;
        Ok(())
    }

    async fn record_delivery_failure(&self, event_id: Uuid, reason: &str) -> Result<()> {
        let update = Query::update()
            .table(OutboxEvents::Table)
            .value(OutboxEvents::DeliveryFailureReason, reason)
            .and_where(Expr::col(OutboxEvents::EventId).eq(event_id.to_string()))
            .and_where(
                Expr::col(OutboxEvents::DeliveryStatus).ne(DeliveryStatus::Delivered.to_string()),
            )
            .to_string(PostgresQueryBuilder);

        sqlx::query(&update).execute(&self.pool).await?;
        Ok(())
    }

    async fn claim_for_resend(&self, event_id: Uuid, max_attempts: i32) -> Result<bool> {
        let update = Query::update()
            .table(OutboxEvents::Table)
            .value(
                OutboxEvents::PublishAttempts,
                Expr::col(OutboxEvents::PublishAttempts).add(1),
            )
            .value(OutboxEvents::PublishLastAttemptAt, fmt_ts(Utc::now()))
            .and_where(Expr::col(OutboxEvents::EventId).eq(event_id.to_string()))
            .and_where(
                Expr::col(OutboxEvents::PublishStatus).eq(PublishStatus::Pending.to_string()),
            )
            .and_where(Expr::col(OutboxEvents::PublishAttempts).lt(max_attempts))
            .to_string(PostgresQueryBuilder);

        let result = sqlx::query(&update).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_for_redelivery(&self, event_id: Uuid, max_attempts: i32) -> Result<bool> {
        let update = Query::update()
            .table(OutboxEvents::Table)
            .value(
                OutboxEvents::DeliveryAttempts,
                Expr::col(OutboxEvents::DeliveryAttempts).add(1),
            )
            .value(OutboxEvents::DeliveryLastAttemptAt, fmt_ts(Utc::now()))
            .and_where(Expr::col(OutboxEvents::EventId).eq(event_id.to_string()))
            .and_where(
                Expr::col(OutboxEvents::PublishStatus).eq(PublishStatus::Published.to_string()),
            )
            .and_where(
                Expr::col(OutboxEvents::DeliveryStatus).ne(DeliveryStatus::Delivered.to_string()),
            )
            .and_where(Expr::col(OutboxEvents::DeliveryAttempts).lt(max_attempts))
            .to_string(PostgresQueryBuilder);

        let result = sqlx::query(&update).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn resend_candidates(&self, filter: &RetryFilter) -> Result<Vec<OutboxEvent>> {
        let select = Self::candidate_query(filter, PublishStatus::Pending, false);
        let rows = sqlx::query(&select).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn redelivery_candidates(&self, filter: &RetryFilter) -> Result<Vec<OutboxEvent>> {
        let select = Self::candidate_query(filter, PublishStatus::Published, true);
        let rows = sqlx::query(&select).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    async fn advance_delivery(
        &self,
        event_id: Uuid,
        outcome: ReceiptOutcome,
        failure_reason: Option<&str>,
    ) -> Result<bool> {
        let mut update = Query::update();
        update
            .table(OutboxEvents::Table)
            .and_where(Expr::col(OutboxEvents::EventId).eq(event_id.to_string()))
            .and_where(
                Expr::col(OutboxEvents::DeliveryStatus).ne(DeliveryStatus::Delivered.to_string()),
            );

        if outcome.is_success() {
            update
                .value(
                    OutboxEvents::DeliveryStatus,
                    DeliveryStatus::Delivered.to_string(),
                )
                .value(OutboxEvents::DeliveredAt, fmt_ts(Utc::now()))
                .value(OutboxEvents::DeliveryFailureReason, Option::<String>::None);
        } else {
            update
                .value(
                    OutboxEvents::DeliveryStatus,
                    DeliveryStatus::Failed.to_string(),
                )
                .value(
                    OutboxEvents::DeliveryFailureReason,
                    failure_reason.map(|s| s.to_string()),
                );
        }

        let sql = update.to_string(PostgresQueryBuilder);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_receipt(
        &self,
        event_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<DeliveryReceipt>> {
        let select = Query::select()
            .column(Asterisk)
            .from(DeliveryReceipts::Table)
            .and_where(Expr::col(DeliveryReceipts::EventId).eq(event_id.to_string()))
            .and_where(Expr::col(DeliveryReceipts::TenantId).eq(tenant_id.to_string()))
            .order_by(DeliveryReceipts::CreatedAt, Order::Asc)
            .limit(1)
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&select).fetch_optional(&self.pool).await?;
        row.map(|r| Self::row_to_receipt(&r)).transpose()
    }

    async fn insert_receipt(&self, receipt: &DeliveryReceipt) -> Result<()> {
        let insert = Query::insert()
            .into_table(DeliveryReceipts::Table)
            .columns([
                DeliveryReceipts::ReceiptId,
                DeliveryReceipts::EventId,
                DeliveryReceipts::TenantId,
                DeliveryReceipts::EventType,
                DeliveryReceipts::Outcome,
                DeliveryReceipts::FailureReason,
                DeliveryReceipts::ReceivedAt,
                DeliveryReceipts::CreatedAt,
            ])
            .values_panic([
                receipt.receipt_id.to_string().into(),
                receipt.event_id.to_string().into(),
                receipt.tenant_id.to_string().into(),
                receipt.event_type.to_string().into(),
                receipt.outcome.to_string().into(),
                receipt.failure_reason.clone().into(),
                fmt_ts(receipt.received_at).into(),
                fmt_ts(receipt.created_at).into(),
            ])
            .to_string(PostgresQueryBuilder);

        sqlx::query(&insert).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_counts(&self, tenant_id: Option<Uuid>) -> Result<HealthCounts> {
        let pending = Query::select()
            .expr(Expr::col(OutboxEvents::EventId).count())
            .from(OutboxEvents::Table)
            .cond_where(
                Cond::all()
                    .add_option(
                        tenant_id.map(|t| Expr::col(OutboxEvents::TenantId).eq(t.to_string())),
                    )
                    .add(
                        Cond::any()
                            .add(
                                Expr::col(OutboxEvents::PublishStatus)
                                    .eq(PublishStatus::Pending.to_string()),
                            )
                            .add(
                                Cond::all()
                                    .add(
                                        Expr::col(OutboxEvents::PublishStatus)
                                            .eq(PublishStatus::Published.to_string()),
                                    )
                                    .add(
                                        Expr::col(OutboxEvents::DeliveryStatus)
                                            .eq(DeliveryStatus::Pending.to_string()),
                                    ),
                            ),
                    ),
            )
            .to_string(PostgresQueryBuilder);

        let failed = Query::select()
            .expr(Expr::col(OutboxEvents::EventId).count())
            .from(OutboxEvents::Table)
            .cond_where(
                Cond::all()
                    .add_option(
                        tenant_id.map(|t| Expr::col(OutboxEvents::TenantId).eq(t.to_string())),
                    )
                    .add(
                        Cond::any()
                            .add(
                                Expr::col(OutboxEvents::PublishStatus)
                                    .eq(PublishStatus::Failed.to_string()),
                            )
                            .add(
                                Expr::col(OutboxEvents::DeliveryStatus)
                                    .eq(DeliveryStatus::Failed.to_string()),
                            ),
                    ),
            )
            .to_string(PostgresQueryBuilder);

        let pending_count: i64 = sqlx::query(&pending).fetch_one(&self.pool).await?.get(0);
        let failed_count: i64 = sqlx::query(&failed).fetch_one(&self.pool).await?.get(0);

        Ok(HealthCounts {
            pending_count: pending_count as u64,
            failed_count: failed_count as u64,
        })
    }
}

#[async_trait]
impl TenantDirectory for PostgresStore {
    async fn tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>> {
        let select = Query::select()
            .column(Asterisk)
            .from(Tenants::Table)
            .and_where(Expr::col(Tenants::TenantId).eq(tenant_id.to_string()))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&select).fetch_optional(&self.pool).await?;
        row.map(|r| Self::row_to_tenant(&r)).transpose()
    }

    async fn active_credential(&self, tenant_id: Uuid) -> Result<Option<Credential>> {
        let select = Query::select()
            .column(Asterisk)
            .from(TenantCredentials::Table)
            .and_where(Expr::col(TenantCredentials::TenantId).eq(tenant_id.to_string()))
            .and_where(Expr::col(TenantCredentials::Status).eq("active"))
            .order_by(TenantCredentials::CreatedAt, Order::Desc)
            .limit(1)
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&select).fetch_optional(&self.pool).await?;
        row.map(|r| Self::row_to_credential(&r)).transpose()
    }
}
