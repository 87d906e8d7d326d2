//! Administrative re-drive of stuck rows.
//!
//! Both operations run as a bounded synchronous batch: select candidates,
//! then for each row claim-then-send. The claim is a single conditional
//! update that increments the attempt count *before* the broker call, so a
//! crash mid-retry can only over-count (harmless under at-least-once),
//! never under-count into a retry storm. A claim that affects zero rows
//! means a racing replica took the row or it settled; the row is skipped
//! without touching the report.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{EventPublisher, Result};
use crate::model::OutboxEvent;
use crate::storage::{OutboxStore, RetryFilter, TenantDirectory};

/// Outcome of one retry batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Rows this invocation claimed.
    pub attempted: u64,
    /// Claimed rows the broker accepted.
    pub succeeded: u64,
    /// Claimed rows that failed again (reason recorded on the row).
    pub failed: u64,
}

/// Re-drives events stuck in the publish or delivery stage.
pub struct RetryCoordinator {
    store: Arc<dyn OutboxStore>,
    directory: Arc<dyn TenantDirectory>,
    publisher: EventPublisher,
}

impl RetryCoordinator {
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

    /// Re-drive rows whose publish never reached the broker.
    #[tracing::instrument(name = "outbox.resend", skip_all)]
    pub async fn resend(&self, filter: &RetryFilter) -> Result<RetryReport> {
        let candidates = self.store.resend_candidates(filter).await?;
        debug!(candidates = candidates.len(), "Selected resend candidates");

        let mut report = RetryReport::default();

        for event in candidates {
            if !self
                .store
                .claim_for_resend(event.event_id, filter.max_attempts)
                .await?
            {
                debug!(event_id = %event.event_id, "Lost resend claim, skipping");
                continue;
            }
            report.attempted += 1;

            match self.publish_for_tenant(&event).await? {
                Ok(()) => {
                    self.store.mark_published(event.event_id).await?;
                    report.succeeded += 1;
                }
                Err(reason) => {
                    warn!(event_id = %event.event_id, reason = %reason, "Resend failed");
                    self.store
                        .record_publish_failure(event.event_id, &reason)
                        .await?;
                    report.failed += 1;
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Resend batch finished"
        );
        Ok(report)
    }

    /// Re-publish rows that were published but never acknowledged, so the
    /// consumer can process them again. Receipts only ever come from the
    /// delivery receiver; this operation never writes one.
    #[tracing::instrument(name = "outbox.redeliver", skip_all)]
    pub async fn redeliver(&self, filter: &RetryFilter) -> Result<RetryReport> {
        let candidates = self.store.redelivery_candidates(filter).await?;
        debug!(
            candidates = candidates.len(),
            "Selected redelivery candidates"
        );

        let mut report = RetryReport::default();

        for event in candidates {
            if !self
                .store
                .claim_for_redelivery(event.event_id, filter.max_attempts)
                .await?
            {
                debug!(event_id = %event.event_id, "Lost redelivery claim, skipping");
                continue;
            }
            report.attempted += 1;

            match self.publish_for_tenant(&event).await? {
                Ok(()) => {
                    report.succeeded += 1;
                }
                Err(reason) => {
                    warn!(event_id = %event.event_id, reason = %reason, "Redelivery failed");
                    self.store
                        .record_delivery_failure(event.event_id, &reason)
                        .await?;
                    report.failed += 1;
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Redelivery batch finished"
        );
        Ok(report)
    }

    /// Resolve the tenant's routing name at publish time and attempt the
    /// broker hand-off. Inner `Err` carries the failure reason to record
    /// on the row; rows of missing or non-active tenants fail here rather
    /// than publish into a queue nobody owns.
    async fn publish_for_tenant(
        &self,
        event: &OutboxEvent,
    ) -> Result<std::result::Result<(), String>> {
        let tenant = match self.directory.tenant(event.tenant_id).await? {
            Some(tenant) => tenant,
            None => return Ok(Err(format!("tenant {} not found", event.tenant_id))),
        };
        if !tenant.is_active() {
            return Ok(Err(format!(
                "tenant {} is {}",
                tenant.tenant_id, tenant.status
            )));
        }

        match self.publisher.attempt(event, &tenant.routing_name).await {
            Ok(()) => Ok(Ok(())),
            Err(e) => Ok(Err(e.to_string())),
        }
    }
}
