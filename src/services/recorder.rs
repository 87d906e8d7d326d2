//! Event recording: the outbox write path.
//!
//! `record_event` is called synchronously inside the entity service's own
//! write path, so its failure contract is asymmetric on purpose: a storage
//! failure is fatal (the event cannot be durably recorded at all) while a
//! broker failure is invisible to the caller (the row is durable and will
//! be re-driven later).

use std::sync::Arc;

use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{EventPublisher, RelayError, Result};
use crate::model::{EventType, NewOutboxEvent};
use crate::storage::{OutboxStore, TenantDirectory};

/// Input for recording a new event.
///
/// The tenant id comes from the authenticated caller identity, never from
/// the payload.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub entity_id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: EventType,
    /// Which internal operation produced the event.
    pub origin: String,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Records events durably and attempts the first publish.
pub struct EventRecorder {
    store: Arc<dyn OutboxStore>,
    directory: Arc<dyn TenantDirectory>,
    publisher: EventPublisher,
}

impl EventRecorder {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        directory: Arc<dyn TenantDirectory>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            store,
            directory,
            publisher,
        }
    }

    /// Record an event and attempt to publish it.
    ///
    /// Returns the event id once the row is durable. The publish attempt is
    /// best-effort: on broker failure the row stays `pending` with the
    /// failure reason recorded and the caller still gets the id.
    #[tracing::instrument(name = "outbox.record_event", skip_all, fields(tenant_id = %request.tenant_id, event_type = %request.event_type))]
    pub async fn record_event(&self, request: RecordEvent) -> Result<Uuid> {
        let tenant = self
            .directory
            .tenant(request.tenant_id)
            .await?
            .ok_or(RelayError::UnknownTenant {
                tenant_id: request.tenant_id,
            })?;

        if !tenant.is_active() {
            return Err(RelayError::TenantNotActive {
                tenant_id: tenant.tenant_id,
                status: tenant.status,
            });
        }

        let new_event = NewOutboxEvent {
            event_id: Uuid::new_v4(),
            entity_id: request.entity_id,
            tenant_id: request.tenant_id,
            event_type: request.event_type,
            origin: request.origin,
            payload: request.payload,
            metadata: request.metadata,
        };

        // The only fatal step: without a durable row there is nothing to retry.
        let event = self.store.create_event(&new_event).await?;
        debug!(event_id = %event.event_id, "Event recorded");

        match self.publisher.attempt(&event, &tenant.routing_name).await {
            Ok(()) => {
                // Bookkeeping after a successful hand-off is best-effort:
                // the row is durable and a stale `pending` only costs one
                // redundant re-publish, which consumers already tolerate.
                match self.store.mark_published(event.event_id).await {
                    Ok(true) => debug!(event_id = %event.event_id, "Event published"),
                    Ok(false) => {
                        debug!(event_id = %event.event_id, "Row already advanced by a concurrent retry")
                    }
                    Err(e) => {
                        error!(event_id = %event.event_id, error = %e, "Failed to mark event published")
                    }
                }
            }
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "Broker publish failed, event left pending for retry"
                );
                if let Err(store_err) = self
                    .store
                    .record_publish_failure(event.event_id, &e.to_string())
                    .await
                {
                    error!(event_id = %event.event_id, error = %store_err, "Failed to record publish failure");
                }
            }
        }

        Ok(event.event_id)
    }
}
