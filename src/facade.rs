//! Relaybox facade for in-process library usage.
//!
//! Bundles the pipeline services behind one handle for the embedding
//! service. Transport (HTTP/gRPC) stays outside; every operation here
//! takes the authenticated tenant id as a parameter.
//!
//! # Example
//!
//! ```ignore
//! use relaybox::config::Config;
//! use relaybox::facade::Relaybox;
//!
//! let config = Config::load()?;
//! let relay = Relaybox::connect(&config).await?;
//!
//! let event_id = relay.record_event(request).await?;
//! let report = relay.resend(&RetryFilter::default()).await?;
//! ```

use std::sync::Arc;

use uuid::Uuid;

use crate::broker::EventBroker;
use crate::config::Config;
use crate::model::{DeliveryReceipt, ReceiptOutcome};
use crate::services::{
    DeliveryReceiver, EventPublisher, EventRecorder, OutboxMonitor, RecordEvent, Result,
    RetryCoordinator, RetryReport,
};
use crate::storage::{HealthCounts, OutboxStore, RetryFilter, TenantDirectory};

/// The assembled outbox pipeline.
pub struct Relaybox {
    recorder: EventRecorder,
    coordinator: RetryCoordinator,
    receiver: DeliveryReceiver,
    monitor: OutboxMonitor,
}

impl Relaybox {
    /// Assemble the pipeline from its parts.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        directory: Arc<dyn TenantDirectory>,
        broker: Arc<dyn EventBroker>,
        config: &Config,
    ) -> Self {
        let publisher = EventPublisher::new(broker, config.broker.publish_timeout());

        Self {
            recorder: EventRecorder::new(store.clone(), directory.clone(), publisher.clone()),
            coordinator: RetryCoordinator::new(store.clone(), directory, publisher),
            receiver: DeliveryReceiver::new(store.clone()),
            monitor: OutboxMonitor::new(store),
        }
    }

    /// Initialize storage and the AMQP broker from configuration.
    #[cfg(feature = "amqp")]
    pub async fn connect(config: &Config) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        use crate::broker::{AmqpBroker, AmqpSettings};

        let (store, directory) = crate::storage::init_storage(&config.storage).await?;
        let broker = AmqpBroker::new(AmqpSettings {
            url: config.broker.url.clone(),
            exchange: config.broker.exchange.clone(),
        })
        .await?;

        Ok(Self::new(store, directory, Arc::new(broker), config))
    }

    /// Durably record an event and attempt its first publish.
    pub async fn record_event(&self, request: RecordEvent) -> Result<Uuid> {
        self.recorder.record_event(request).await
    }

    /// Re-drive events stuck before the broker.
    pub async fn resend(&self, filter: &RetryFilter) -> Result<RetryReport> {
        self.coordinator.resend(filter).await
    }

    /// Re-publish events the consumer never acknowledged.
    pub async fn redeliver(&self, filter: &RetryFilter) -> Result<RetryReport> {
        self.coordinator.redeliver(filter).await
    }

    /// Record a consumer acknowledgment.
    pub async fn confirm_delivery(
        &self,
        event_id: Uuid,
        tenant_id: Uuid,
        outcome: ReceiptOutcome,
        failure_reason: Option<String>,
    ) -> Result<DeliveryReceipt> {
        self.receiver
            .confirm(event_id, tenant_id, outcome, failure_reason)
            .await
    }

    /// Monitoring counts, optionally scoped to one tenant.
    pub async fn health(&self, tenant_id: Option<Uuid>) -> Result<HealthCounts> {
        self.monitor.health(tenant_id).await
    }
}
