//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query
//! building. Backends create the tables at `init()`.

use sea_query::Iden;

/// Outbox events table schema.
#[derive(Iden)]
pub enum OutboxEvents {
    #[iden = "outbox_events"]
    Table,
    #[iden = "event_id"]
    EventId,
    #[iden = "entity_id"]
    EntityId,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "event_type"]
    EventType,
    #[iden = "origin"]
    Origin,
    #[iden = "payload"]
    Payload,
    #[iden = "metadata"]
    Metadata,
    #[iden = "publish_status"]
    PublishStatus,
    #[iden = "published_at"]
    PublishedAt,
    #[iden = "publish_attempts"]
    PublishAttempts,
    #[iden = "publish_first_attempt_at"]
    PublishFirstAttemptAt,
    #[iden = "publish_last_attempt_at"]
    PublishLastAttemptAt,
    #[iden = "publish_failure_reason"]
    PublishFailureReason,
    #[iden = "delivery_status"]
    DeliveryStatus,
    #[iden = "delivered_at"]
    DeliveredAt,
    #[iden = "delivery_attempts"]
    DeliveryAttempts,
    #[iden = "delivery_last_attempt_at"]
    DeliveryLastAttemptAt,
    #[iden = "delivery_failure_reason"]
    DeliveryFailureReason,
    #[iden = "created_at"]
    CreatedAt,
}

/// Tenants table schema.
#[derive(Iden)]
pub enum Tenants {
    #[iden = "tenants"]
    Table,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "routing_name"]
    RoutingName,
    #[iden = "status"]
    Status,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Tenant credentials table schema.
#[derive(Iden)]
pub enum TenantCredentials {
    #[iden = "tenant_credentials"]
    Table,
    #[iden = "credential_id"]
    CredentialId,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "secret_hash"]
    SecretHash,
    #[iden = "status"]
    Status,
    #[iden = "expires_at"]
    ExpiresAt,
    #[iden = "last_used_at"]
    LastUsedAt,
    #[iden = "created_at"]
    CreatedAt,
}

/// Delivery receipts table schema.
#[derive(Iden)]
pub enum DeliveryReceipts {
    #[iden = "delivery_receipts"]
    Table,
    #[iden = "receipt_id"]
    ReceiptId,
    #[iden = "event_id"]
    EventId,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "event_type"]
    EventType,
    #[iden = "outcome"]
    Outcome,
    #[iden = "failure_reason"]
    FailureReason,
    #[iden = "received_at"]
    ReceivedAt,
    #[iden = "created_at"]
    CreatedAt,
}

/// Partial unique index enforcing at most one active credential per tenant.
/// sea-query's index builder has no partial-index support, so this one is
/// raw SQL (the same statement is valid on SQLite and PostgreSQL).
pub const CREATE_ONE_ACTIVE_CREDENTIAL_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS uq_credentials_one_active \
     ON tenant_credentials (tenant_id) WHERE status = 'active'";
