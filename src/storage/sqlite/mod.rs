//! SQLite storage backend.
//!
//! Default backend for local development and tests. Timestamps are stored
//! as fixed-width RFC 3339 TEXT so window filters compare lexicographically;
//! ids are TEXT UUIDs; payloads are serialized JSON.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{
    Asterisk, ColumnDef, Cond, Expr, Index, Order, Query, SqliteQueryBuilder, Table,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
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
use crate::storage::{
    fmt_ts, parse_ts, HealthCounts, OutboxStore, Result, RetryFilter, TenantDirectory,
};

/// SQLite implementation of the outbox store and tenant directory.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub fn new(pool: SqlitePool) -> Self {
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
            .col(ColumnDef::new(OutboxEvents::Payload).text().not_null())
            .col(ColumnDef::new(OutboxEvents::Metadata).text().not_null())
            .col(
                ColumnDef::new(OutboxEvents::PublishStatus)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(OutboxEvents::PublishedAt).text())
            .col(
                ColumnDef::new(OutboxEvents::PublishAttempts)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(OutboxEvents::PublishFirstAttemptAt)
                    .text()
                    .not_null(),
            )
            .col(
                ColumnDef::new(OutboxEvents::PublishLastAttemptAt)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(OutboxEvents::PublishFailureReason).text())
            .col(
                ColumnDef::new(OutboxEvents::DeliveryStatus)
                    .text()
                    .not_null(),
            )
            .col(ColumnDef::new(OutboxEvents::DeliveredAt).text())
            .col(
                ColumnDef::new(OutboxEvents::DeliveryAttempts)
                    .integer()
                    .not_null()
                    .default(0),
            )
            .col(ColumnDef::new(OutboxEvents::DeliveryLastAttemptAt).text())
            .col(ColumnDef::new(OutboxEvents::DeliveryFailureReason).text())
            .col(ColumnDef::new(OutboxEvents::CreatedAt).text().not_null())
            .to_string(SqliteQueryBuilder);

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
            .col(ColumnDef::new(Tenants::CreatedAt).text().not_null())
            .col(ColumnDef::new(Tenants::UpdatedAt).text().not_null())
            .to_string(SqliteQueryBuilder);

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
            .col(ColumnDef::new(TenantCredentials::ExpiresAt).text())
            .col(ColumnDef::new(TenantCredentials::LastUsedAt).text())
            .col(
                ColumnDef::new(TenantCredentials::CreatedAt)
                    .text()
                    .not_null(),
            )
            .to_string(SqliteQueryBuilder);

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
                    .text()
                    .not_null(),
            )
            .col(
                ColumnDef::new(DeliveryReceipts::CreatedAt)
                    .text()
                    .not_null(),
            )
            .to_string(SqliteQueryBuilder);

        for ddl in [
            create_events,
            create_tenants,
            create_credentials,
            create_receipts,
        ] {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }

        // Indexes for retry selection and receipt lookups
        let idx_publish = Index::create()
            .if_not_exists()
            .name("idx_outbox_publish_status")
            .table(OutboxEvents::Table)
            .col(OutboxEvents::PublishStatus)
            .col(OutboxEvents::CreatedAt)
            .to_string(SqliteQueryBuilder);

        let idx_delivery = Index::create()
            .if_not_exists()
            .name("idx_outbox_delivery_status")
            .table(OutboxEvents::Table)
            .col(OutboxEvents::PublishStatus)
            .col(OutboxEvents::DeliveryStatus)
            .col(OutboxEvents::CreatedAt)
            .to_string(SqliteQueryBuilder);

        let idx_receipts = Index::create()
            .if_not_exists()
            .name("idx_receipts_event_tenant")
            .table(DeliveryReceipts::Table)
            .col(DeliveryReceipts::EventId)
            .col(DeliveryReceipts::TenantId)
            .to_string(SqliteQueryBuilder);

        for ddl in [idx_publish, idx_delivery, idx_receipts] {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }

        sqlx::query(CREATE_ONE_ACTIVE_CREDENTIAL_INDEX)
            .execute(&self.pool)
            .await?;

        info!("Outbox schema initialized (SQLite)");
        Ok(())
    }

    fn row_to_event(row: &SqliteRow) -> Result<OutboxEvent> {
        let event_id: String = row.get("event_id");
        let entity_id: String = row.get("entity_id");
        let tenant_id: String = row.get("tenant_id");
        let event_type: String = row.get("event_type");
        let payload: String = row.get("payload");
        let metadata: String = row.get("metadata");
        let publish_status: String = row.get("publish_status");
        let delivery_status: String = row.get("delivery_status");

        Ok(OutboxEvent {
            event_id: Uuid::parse_str(&event_id)?,
            entity_id: Uuid::parse_str(&entity_id)?,
            tenant_id: Uuid::parse_str(&tenant_id)?,
            event_type: event_type.parse()?,
            origin: row.get("origin"),
            payload: serde_json::from_str(&payload)?,
            metadata: serde_json::from_str(&metadata)?,
            publish_status: publish_status.parse()?,
            published_at: row
                .get::<Option<String>, _>("published_at")
                .map(|s| parse_ts(&s))
                .transpose()?,
            publish_attempts: row.get("publish_attempts"),
            publish_first_attempt_at: parse_ts(&row.get::<String, _>("publish_first_attempt_at"))?,
            publish_last_attempt_at: parse_ts(&row.get::<String, _>("publish_last_attempt_at"))?,
            publish_failure_reason: row.get("publish_failure_reason"),
            delivery_status: delivery_status.parse()?,
            delivered_at: row
                .get::<Option<String>, _>("delivered_at")
                .map(|s| parse_ts(&s))
                .transpose()?,
            delivery_attempts: row.get("delivery_attempts"),
            delivery_last_attempt_at: row
                .get::<Option<String>, _>("delivery_last_attempt_at")
                .map(|s| parse_ts(&s))
                .transpose()?,
            delivery_failure_reason: row.get("delivery_failure_reason"),
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        })
    }

    fn row_to_receipt(row: &SqliteRow) -> Result<DeliveryReceipt> {
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
            received_at: parse_ts(&row.get::<String, _>("received_at"))?,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        })
    }

    fn row_to_tenant(row: &SqliteRow) -> Result<Tenant> {
        let tenant_id: String = row.get("tenant_id");
        let routing_name: String = row.get("routing_name");
        let status: String = row.get("status");

        Ok(Tenant {
            tenant_id: Uuid::parse_str(&tenant_id)?,
            routing_name: RoutingName::new(routing_name)?,
            status: status.parse()?,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
            updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
        })
    }

    fn row_to_credential(row: &SqliteRow) -> Result<Credential> {
        let credential_id: String = row.get("credential_id");
        let tenant_id: String = row.get("tenant_id");
        let status: String = row.get("status");

        Ok(Credential {
            credential_id: Uuid::parse_str(&credential_id)?,
            tenant_id: Uuid::parse_str(&tenant_id)?,
            secret_hash: row.get("secret_hash"),
            status: status.parse()?,
            expires_at: row
                .get::<Option<String>, _>("expires_at")
                .map(|s| parse_ts(&s))
                .transpose()?,
            last_used_at: row
                .get::<Option<String>, _>("last_used_at")
                .map(|s| parse_ts(&s))
                .transpose()?,
            created_at: parse_ts(&row.get::<String, _>("created_at"))?,
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

        query.to_string(SqliteQueryBuilder)
    }
}

#[async_trait]
impl OutboxStore for SqliteStore {
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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

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

        let sql = update.to_string(SqliteQueryBuilder);
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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

        let pending_count: i64 = sqlx::query(&pending).fetch_one(&self.pool).await?.get(0);
        let failed_count: i64 = sqlx::query(&failed).fetch_one(&self.pool).await?.get(0);

        Ok(HealthCounts {
            pending_count: pending_count as u64,
            failed_count: failed_count as u64,
        })
    }
}

#[async_trait]
impl TenantDirectory for SqliteStore {
    async fn tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>> {
        let select = Query::select()
            .column(Asterisk)
            .from(Tenants::Table)
            .and_where(Expr::col(Tenants::TenantId).eq(tenant_id.to_string()))
            .to_string(SqliteQueryBuilder);

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
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&select).fetch_optional(&self.pool).await?;
        row.map(|r| Self::row_to_credential(&r)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;
    use tempfile::TempDir;

    async fn test_store() -> (SqliteStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaybox.db");
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.display()))
            .await
            .unwrap();
        let store = SqliteStore::new(pool);
        store.init().await.unwrap();
        (store, dir)
    }

    fn new_event(tenant_id: Uuid) -> NewOutboxEvent {
        NewOutboxEvent {
            event_id: Uuid::new_v4(),
            entity_id: Uuid::new_v4(),
            tenant_id,
            event_type: EventType::EntityCreation,
            origin: "create_entity".to_string(),
            payload: serde_json::json!({"name": "sample", "status": "ACTIVE"}),
            metadata: serde_json::json!({"correlation_id": "abc-123"}),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let (store, _dir) = test_store().await;
        let tenant_id = Uuid::new_v4();

        let created = store.create_event(&new_event(tenant_id)).await.unwrap();
        assert_eq!(created.publish_status, PublishStatus::Pending);
        assert_eq!(created.publish_attempts, 1);
        assert_eq!(created.delivery_attempts, 0);

        let fetched = store.get_event(created.event_id).await.unwrap().unwrap();
        assert_eq!(fetched.event_id, created.event_id);
        assert_eq!(fetched.tenant_id, tenant_id);
        assert_eq!(fetched.event_type, EventType::EntityCreation);
        assert_eq!(fetched.payload["name"], "sample");
        assert_eq!(fetched.publish_status, PublishStatus::Pending);
        assert!(fetched.published_at.is_none());
    }

    #[tokio::test]
    async fn test_get_event_missing_is_none() {
        let (store, _dir) = test_store().await;
        assert!(store.get_event(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_published_is_conditional() {
        let (store, _dir) = test_store().await;
        let event = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();

        assert!(store.mark_published(event.event_id).await.unwrap());
        // Second transition loses: the row is no longer pending.
        assert!(!store.mark_published(event.event_id).await.unwrap());

        let row = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(row.publish_status, PublishStatus::Published);
        assert!(row.published_at.is_some());
        assert_eq!(row.publish_attempts, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_row_pending() {
        let (store, _dir) = test_store().await;
        let event = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();

        store
            .record_publish_failure(event.event_id, "connection refused")
            .await
            .unwrap();

        let row = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(row.publish_status, PublishStatus::Pending);
        assert_eq!(row.publish_failure_reason.as_deref(), Some("connection refused"));
        assert_eq!(row.publish_attempts, 1);
    }

    #[tokio::test]
    async fn test_claim_for_resend_increments_until_cap() {
        let (store, _dir) = test_store().await;
        let event = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();

        assert!(store.claim_for_resend(event.event_id, 3).await.unwrap());
        assert!(store.claim_for_resend(event.event_id, 3).await.unwrap());
        // attempts now 3, cap reached
        assert!(!store.claim_for_resend(event.event_id, 3).await.unwrap());

        let row = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(row.publish_attempts, 3);
    }

    #[tokio::test]
    async fn test_claim_for_resend_zero_cap_selects_nothing() {
        let (store, _dir) = test_store().await;
        let event = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();
        assert!(!store.claim_for_resend(event.event_id, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_for_redelivery_requires_published() {
        let (store, _dir) = test_store().await;
        let event = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();

        assert!(!store.claim_for_redelivery(event.event_id, 3).await.unwrap());

        store.mark_published(event.event_id).await.unwrap();
        assert!(store.claim_for_redelivery(event.event_id, 3).await.unwrap());

        let row = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(row.delivery_attempts, 1);
        assert!(row.delivery_last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn test_advance_delivery_never_downgrades() {
        let (store, _dir) = test_store().await;
        let event = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();
        store.mark_published(event.event_id).await.unwrap();

        assert!(store
            .advance_delivery(event.event_id, ReceiptOutcome::Processed, None)
            .await
            .unwrap());
        let delivered = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(delivered.delivery_status, DeliveryStatus::Delivered);
        let delivered_at = delivered.delivered_at.unwrap();

        // A late failure report must not regress the settled row.
        assert!(!store
            .advance_delivery(event.event_id, ReceiptOutcome::Failed, Some("late"))
            .await
            .unwrap());
        let row = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(row.delivery_status, DeliveryStatus::Delivered);
        assert_eq!(row.delivered_at.unwrap(), delivered_at);
    }

    #[tokio::test]
    async fn test_advance_delivery_failed_outcome() {
        let (store, _dir) = test_store().await;
        let event = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();
        store.mark_published(event.event_id).await.unwrap();

        assert!(store
            .advance_delivery(event.event_id, ReceiptOutcome::Failed, Some("parse error"))
            .await
            .unwrap());
        let row = store.get_event(event.event_id).await.unwrap().unwrap();
        assert_eq!(row.delivery_status, DeliveryStatus::Failed);
        assert_eq!(row.delivery_failure_reason.as_deref(), Some("parse error"));
        assert!(row.delivered_at.is_none());
    }

    #[tokio::test]
    async fn test_resend_candidates_respect_filter() {
        let (store, _dir) = test_store().await;
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let a = store.create_event(&new_event(tenant_a)).await.unwrap();
        let b = store.create_event(&new_event(tenant_b)).await.unwrap();
        let published = store.create_event(&new_event(tenant_a)).await.unwrap();
        store.mark_published(published.event_id).await.unwrap();

        let all = store
            .resend_candidates(&RetryFilter::default())
            .await
            .unwrap();
        let ids: Vec<Uuid> = all.iter().map(|e| e.event_id).collect();
        assert!(ids.contains(&a.event_id));
        assert!(ids.contains(&b.event_id));
        assert!(!ids.contains(&published.event_id));

        let scoped = store
            .resend_candidates(&RetryFilter {
                tenant_id: Some(tenant_b),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].event_id, b.event_id);

        let none = store
            .resend_candidates(&RetryFilter {
                max_attempts: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());

        let wrong_type = store
            .resend_candidates(&RetryFilter {
                event_types: Some(vec![EventType::EntityDeletion]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(wrong_type.is_empty());
    }

    #[tokio::test]
    async fn test_redelivery_candidates_exclude_delivered() {
        let (store, _dir) = test_store().await;
        let pending_publish = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();

        let undelivered = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();
        store.mark_published(undelivered.event_id).await.unwrap();

        let delivered = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();
        store.mark_published(delivered.event_id).await.unwrap();
        store
            .advance_delivery(delivered.event_id, ReceiptOutcome::Processed, None)
            .await
            .unwrap();

        let candidates = store
            .redelivery_candidates(&RetryFilter::default())
            .await
            .unwrap();
        let ids: Vec<Uuid> = candidates.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![undelivered.event_id]);
        assert!(!ids.contains(&pending_publish.event_id));
    }

    #[tokio::test]
    async fn test_receipts_append_and_find_first() {
        let (store, _dir) = test_store().await;
        let event = store.create_event(&new_event(Uuid::new_v4())).await.unwrap();

        assert!(store
            .find_receipt(event.event_id, event.tenant_id)
            .await
            .unwrap()
            .is_none());

        let now = Utc::now();
        let first = DeliveryReceipt {
            receipt_id: Uuid::new_v4(),
            event_id: event.event_id,
            tenant_id: event.tenant_id,
            event_type: event.event_type,
            outcome: ReceiptOutcome::Processed,
            failure_reason: None,
            received_at: now,
            created_at: now,
        };
        store.insert_receipt(&first).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(1);
        let duplicate = DeliveryReceipt {
            receipt_id: Uuid::new_v4(),
            received_at: later,
            created_at: later,
            ..first.clone()
        };
        store.insert_receipt(&duplicate).await.unwrap();

        let found = store
            .find_receipt(event.event_id, event.tenant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.receipt_id, first.receipt_id);
    }

    #[tokio::test]
    async fn test_health_counts() {
        let (store, _dir) = test_store().await;
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        // pending publish
        store.create_event(&new_event(tenant_a)).await.unwrap();
        // published, awaiting delivery
        let awaiting = store.create_event(&new_event(tenant_a)).await.unwrap();
        store.mark_published(awaiting.event_id).await.unwrap();
        // delivery failed
        let failed = store.create_event(&new_event(tenant_b)).await.unwrap();
        store.mark_published(failed.event_id).await.unwrap();
        store
            .advance_delivery(failed.event_id, ReceiptOutcome::Failed, Some("boom"))
            .await
            .unwrap();

        let all = store.health_counts(None).await.unwrap();
        assert_eq!(all.pending_count, 2);
        assert_eq!(all.failed_count, 1);

        let scoped = store.health_counts(Some(tenant_a)).await.unwrap();
        assert_eq!(scoped.pending_count, 2);
        assert_eq!(scoped.failed_count, 0);
    }

    #[tokio::test]
    async fn test_tenant_directory_lookup() {
        let (store, _dir) = test_store().await;
        let tenant_id = Uuid::new_v4();
        let now = fmt_ts(Utc::now());

        let insert = Query::insert()
            .into_table(Tenants::Table)
            .columns([
                Tenants::TenantId,
                Tenants::RoutingName,
                Tenants::Status,
                Tenants::CreatedAt,
                Tenants::UpdatedAt,
            ])
            .values_panic([
                tenant_id.to_string().into(),
                "acme".into(),
                "active".into(),
                now.clone().into(),
                now.into(),
            ])
            .to_string(SqliteQueryBuilder);
        sqlx::query(&insert).execute(&store.pool).await.unwrap();

        let tenant = store.tenant(tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.routing_name.as_str(), "acme");
        assert!(tenant.is_active());

        assert!(store.tenant(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store
            .active_credential(tenant_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_active_credential_lookup_skips_revoked() {
        let (store, _dir) = test_store().await;
        let tenant_id = Uuid::new_v4();
        let active_id = Uuid::new_v4();

        for (credential_id, status, offset_secs) in [
            (Uuid::new_v4(), "deactivated", 0),
            (active_id, "active", 1),
        ] {
            let created = fmt_ts(Utc::now() + chrono::Duration::seconds(offset_secs));
            let insert = Query::insert()
                .into_table(TenantCredentials::Table)
                .columns([
                    TenantCredentials::CredentialId,
                    TenantCredentials::TenantId,
                    TenantCredentials::SecretHash,
                    TenantCredentials::Status,
                    TenantCredentials::CreatedAt,
                ])
                .values_panic([
                    credential_id.to_string().into(),
                    tenant_id.to_string().into(),
                    "sha256:deadbeef".into(),
                    status.into(),
                    created.into(),
                ])
                .to_string(SqliteQueryBuilder);
            sqlx::query(&insert).execute(&store.pool).await.unwrap();
        }

        let credential = store.active_credential(tenant_id).await.unwrap().unwrap();
        assert_eq!(credential.credential_id, active_id);
        assert_eq!(credential.status, crate::model::CredentialStatus::Active);
        assert!(credential.expires_at.is_none());
    }
}
