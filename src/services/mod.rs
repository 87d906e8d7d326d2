//! Core pipeline operations.
//!
//! - `EventRecorder`: durable event creation + best-effort first publish
//! - `EventPublisher`: one bounded broker hand-off attempt
//! - `RetryCoordinator`: administrative re-drive of stuck rows
//! - `DeliveryReceiver`: idempotent consumer acknowledgments
//! - `OutboxMonitor`: read-only health counts
//!
//! Broker failures never appear in these results: they are absorbed into
//! row state and retried later. Storage failures always do, since the
//! store is the pipeline's only consistency anchor.

use uuid::Uuid;

use crate::model::TenantStatus;
use crate::storage::StorageError;

mod monitor;
mod publisher;
mod receiver;
mod recorder;
mod retry;

pub use monitor::OutboxMonitor;
pub use publisher::EventPublisher;
pub use receiver::DeliveryReceiver;
pub use recorder::{EventRecorder, RecordEvent};
pub use retry::{RetryCoordinator, RetryReport};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors surfaced by pipeline operations.
///
/// `UnknownEvent` and `TenantMismatch` deliberately render the same
/// "not found" shape: an acknowledgment for someone else's event must not
/// reveal that the event exists at all. The distinction is kept as a
/// variant so operators can log and alert on mismatch attempts.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("tenant {tenant_id} not found")]
    UnknownTenant { tenant_id: Uuid },

    #[error("tenant {tenant_id} is {status}")]
    TenantNotActive {
        tenant_id: Uuid,
        status: TenantStatus,
    },

    #[error("event {event_id} not found")]
    UnknownEvent { event_id: Uuid },

    #[error("event {event_id} not found for calling tenant")]
    TenantMismatch { event_id: Uuid },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
