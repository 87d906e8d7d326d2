//! Durable storage for the outbox pipeline.
//!
//! The store is the single source of truth and the only shared mutable
//! resource: every status transition is a conditional UPDATE whose
//! `rows_affected` tells the caller whether it won the transition. Service
//! instances never coordinate in memory.
//!
//! Backends: SQLite (default feature, local development and tests) and
//! PostgreSQL (feature `postgres`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::model::{
    Credential, DeliveryReceipt, EventType, NewOutboxEvent, OutboxEvent, ReceiptOutcome,
    RoutingNameError, Tenant, UnknownVariant,
};

pub mod schema;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: '{0}'")]
    InvalidTimestamp(String),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    UnknownVariant(#[from] UnknownVariant),

    #[error("Invalid routing name in storage: {0}")]
    InvalidRoutingName(#[from] RoutingNameError),
}

/// Filter bounding a retry batch.
///
/// Both retry operations take the same shape: a lookback window, an attempt
/// ceiling, optional event-type and tenant scoping, and a hard cap on how
/// many rows one invocation may touch. Rows at or past `max_attempts` are
/// never selected; `max_attempts = 0` therefore selects nothing.
#[derive(Debug, Clone)]
pub struct RetryFilter {
    /// Only rows created within the last N days are considered.
    pub lookback_days: i64,
    /// Rows with this many attempts or more are left alone.
    pub max_attempts: i32,
    /// Restrict to these event types (None = all).
    pub event_types: Option<Vec<EventType>>,
    /// Restrict to a single tenant (None = all).
    pub tenant_id: Option<Uuid>,
    /// Upper bound on rows per invocation; callers re-trigger for more.
    pub batch_limit: u64,
}

impl Default for RetryFilter {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            max_attempts: 5,
            event_types: None,
            tenant_id: None,
            batch_limit: 100,
        }
    }
}

/// Read-only monitoring counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthCounts {
    /// Rows still awaiting publish, or published but not yet delivered.
    pub pending_count: u64,
    /// Rows whose publish or delivery lifecycle is `failed`.
    pub failed_count: u64,
}

/// Interface for outbox event and receipt persistence.
///
/// Implementations must make every status-changing method a single atomic
/// conditional update: the mutation applies only if the row is still in the
/// expected prior state, and the `bool` returns report whether it did.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert a new event row with publish status `pending`.
    ///
    /// Creation counts as the first publish attempt: the row starts with
    /// `publish_attempts = 1` and both attempt timestamps stamped.
    async fn create_event(&self, event: &NewOutboxEvent) -> Result<OutboxEvent>;

    /// Fetch an event row by id.
    async fn get_event(&self, event_id: Uuid) -> Result<Option<OutboxEvent>>;

    /// Advance publish status `pending -> published` and stamp
    /// `published_at`. Returns false if the row was not `pending`.
    async fn mark_published(&self, event_id: Uuid) -> Result<bool>;

    /// Record a failed publish attempt's reason without touching the
    /// attempt count (increments belong to the claim step).
    async fn record_publish_failure(&self, event_id: Uuid, reason: &str) -> Result<()>;

    /// Record a failed redelivery attempt's reason.
    async fn record_delivery_failure(&self, event_id: Uuid, reason: &str) -> Result<()>;

    /// Atomically claim a row for a publish retry: increments the attempt
    /// count and stamps the attempt time, but only while the row is still
    /// `pending` and under `max_attempts`. Returns false when a racing
    /// replica already claimed it, the row settled, or attempts ran out.
    async fn claim_for_resend(&self, event_id: Uuid, max_attempts: i32) -> Result<bool>;

    /// Atomically claim a row for a delivery retry: same contract as
    /// [`claim_for_resend`](Self::claim_for_resend), on the delivery
    /// lifecycle of a row that is `published` and not yet `delivered`.
    async fn claim_for_redelivery(&self, event_id: Uuid, max_attempts: i32) -> Result<bool>;

    /// Rows eligible for `resend`: publish status `pending`, inside the
    /// lookback window, attempts below the ceiling.
    async fn resend_candidates(&self, filter: &RetryFilter) -> Result<Vec<OutboxEvent>>;

    /// Rows eligible for `redeliver`: `published` but not `delivered`.
    async fn redelivery_candidates(&self, filter: &RetryFilter) -> Result<Vec<OutboxEvent>>;

    /// Advance the delivery lifecycle from a first acknowledgment. Success
    /// outcomes set `delivered` + `delivered_at`; `failed` sets `failed`
    /// with the reason. Never downgrades a row already `delivered`;
    /// returns whether the row changed.
    async fn advance_delivery(
        &self,
        event_id: Uuid,
        outcome: ReceiptOutcome,
        failure_reason: Option<&str>,
    ) -> Result<bool>;

    /// Earliest receipt for an (event, tenant) pair, if any.
    async fn find_receipt(&self, event_id: Uuid, tenant_id: Uuid)
        -> Result<Option<DeliveryReceipt>>;

    /// Append a receipt row (duplicates are recorded, never rejected).
    async fn insert_receipt(&self, receipt: &DeliveryReceipt) -> Result<()>;

    /// Monitoring counts, optionally scoped to one tenant.
    async fn health_counts(&self, tenant_id: Option<Uuid>) -> Result<HealthCounts>;
}

/// Read access to tenant and credential rows.
///
/// Provisioning owns these tables; the core only resolves routing names,
/// activity status, and the single active credential per tenant.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Fetch a tenant by id.
    async fn tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>>;

    /// The tenant's single `active` credential, if one exists.
    async fn active_credential(&self, tenant_id: Uuid) -> Result<Option<Credential>>;
}

/// Initialize storage based on configuration.
///
/// Returns the same backend instance behind both trait seams.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<(Arc<dyn OutboxStore>, Arc<dyn TenantDirectory>), Box<dyn std::error::Error>>
{
    info!(storage = %config.storage_type, "Initializing storage");

    match config.storage_type.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;

            let store = Arc::new(SqliteStore::new(pool));
            store.init().await?;

            let outbox: Arc<dyn OutboxStore> = store.clone();
            let directory: Arc<dyn TenantDirectory> = store;
            Ok((outbox, directory))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => {
            error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = config
                .url
                .as_deref()
                .ok_or("PostgreSQL storage requires storage.url")?;
            let pool = sqlx::PgPool::connect(url).await?;

            let store = Arc::new(PostgresStore::new(pool));
            store.init().await?;

            let outbox: Arc<dyn OutboxStore> = store.clone();
            let directory: Arc<dyn TenantDirectory> = store;
            Ok((outbox, directory))
        }
        #[cfg(not(feature = "postgres"))]
        "postgres" => {
            error!("PostgreSQL storage requested but 'postgres' feature is not enabled");
            Err("PostgreSQL feature not enabled".into())
        }
        other => {
            error!(storage = %other, "Unknown storage type");
            Err(format!("Unknown storage type: {}", other).into())
        }
    }
}

/// Fixed-width RFC 3339 rendering so stored timestamps compare
/// lexicographically in TEXT columns and coerce cleanly in PostgreSQL.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back into UTC.
pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_filter_defaults() {
        let filter = RetryFilter::default();
        assert_eq!(filter.lookback_days, 7);
        assert_eq!(filter.max_attempts, 5);
        assert_eq!(filter.batch_limit, 100);
        assert!(filter.event_types.is_none());
        assert!(filter.tenant_id.is_none());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_ts(&fmt_ts(now)).unwrap();
        // Micros rendering truncates below microsecond precision.
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_timestamp_rendering_is_fixed_width() {
        let a = fmt_ts(Utc::now());
        assert!(a.ends_with('Z'));
        assert_eq!(a.len(), "2026-01-01T00:00:00.000000Z".len());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_ts("not-a-time"),
            Err(StorageError::InvalidTimestamp(_))
        ));
    }
}
