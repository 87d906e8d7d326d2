//! Consumer acknowledgment intake.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{RelayError, Result};
use crate::model::{DeliveryReceipt, ReceiptOutcome};
use crate::storage::OutboxStore;

/// Records delivery acknowledgments idempotently.
pub struct DeliveryReceiver {
    store: Arc<dyn OutboxStore>,
}

impl DeliveryReceiver {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    /// Record a consumer's acknowledgment of an event.
    ///
    /// The first receipt for an (event, tenant) pair advances the event's
    /// delivery status; any later acknowledgment is an idempotent replay
    /// that appends an audit receipt and returns success without touching
    /// the already-settled row. Cross-tenant calls fail closed: the error
    /// is indistinguishable from an unknown event.
    #[tracing::instrument(name = "outbox.confirm_delivery", skip_all, fields(event_id = %event_id, outcome = %outcome))]
    pub async fn confirm(
        &self,
        event_id: Uuid,
        tenant_id: Uuid,
        outcome: ReceiptOutcome,
        failure_reason: Option<String>,
    ) -> Result<DeliveryReceipt> {
        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(RelayError::UnknownEvent { event_id })?;

        if event.tenant_id != tenant_id {
            warn!(
                event_id = %event_id,
                caller_tenant = %tenant_id,
                "Cross-tenant delivery confirmation rejected"
            );
            return Err(RelayError::TenantMismatch { event_id });
        }

        let first_receipt = self.store.find_receipt(event_id, tenant_id).await?;

        if first_receipt.is_none() {
            let advanced = self
                .store
                .advance_delivery(event_id, outcome, failure_reason.as_deref())
                .await?;
            debug!(event_id = %event_id, advanced, "Delivery status updated");
        } else {
            debug!(
                event_id = %event_id,
                "Duplicate acknowledgment, recording receipt for audit only"
            );
        }

        let now = Utc::now();
        let receipt = DeliveryReceipt {
            receipt_id: Uuid::new_v4(),
            event_id,
            tenant_id,
            event_type: event.event_type,
            outcome,
            failure_reason,
            received_at: now,
            created_at: now,
        };
        self.store.insert_receipt(&receipt).await?;

        Ok(receipt)
    }
}
