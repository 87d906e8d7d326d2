//! Read-only pipeline health.

use std::sync::Arc;

use uuid::Uuid;

use super::Result;
use crate::storage::{HealthCounts, OutboxStore};

/// Reports stuck-row counts for monitoring.
///
/// Retry exhaustion is intentionally not an API error anywhere in the
/// pipeline; it shows up here as rows that stay counted until an operator
/// intervenes.
pub struct OutboxMonitor {
    store: Arc<dyn OutboxStore>,
}

impl OutboxMonitor {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    /// Pending/failed counts, optionally scoped to one tenant.
    pub async fn health(&self, tenant_id: Option<Uuid>) -> Result<HealthCounts> {
        Ok(self.store.health_counts(tenant_id).await?)
    }
}
