//! AMQP (RabbitMQ) broker implementation.
//!
//! Publishes event envelopes to a durable topic exchange. Connections are
//! pooled per service instance; channels are created per publish so a
//! broken channel never poisons later attempts.

use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, ExchangeKind,
};
use tracing::{debug, info};

use async_trait::async_trait;

use super::{BrokerError, EventBroker, EventEnvelope, Result};
use crate::broker::topology::EVENTS_EXCHANGE;

/// Connection settings for the AMQP broker.
#[derive(Clone, Debug)]
pub struct AmqpSettings {
    /// AMQP connection URL (e.g., amqp://localhost:5672).
    pub url: String,
    /// Exchange events are published to.
    pub exchange: String,
}

impl AmqpSettings {
    /// Settings for the default exchange.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: EVENTS_EXCHANGE.to_string(),
        }
    }
}

/// AMQP broker using RabbitMQ.
pub struct AmqpBroker {
    pool: Pool,
    settings: AmqpSettings,
}

impl AmqpBroker {
    /// Connect and declare the events exchange.
    pub async fn new(settings: AmqpSettings) -> Result<Self> {
        let manager = Manager::new(settings.url.clone(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| BrokerError::Connection(format!("Failed to create pool: {}", e)))?;

        // Verify connection and declare the exchange up front
        let conn = pool
            .get()
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to connect: {}", e)))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to create channel: {}", e)))?;

        channel
            .exchange_declare(
                &settings.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to declare exchange: {}", e)))?;

        info!(
            exchange = %settings.exchange,
            url = %settings.url,
            "Connected to AMQP"
        );

        Ok(Self { pool, settings })
    }

    /// Get a fresh channel from the pooled connection.
    async fn get_channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BrokerError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to create channel: {}", e)))
    }
}

#[async_trait]
impl EventBroker for AmqpBroker {
    #[tracing::instrument(name = "broker.publish", skip_all, fields(routing_key = %routing_key))]
    async fn publish(&self, routing_key: &str, envelope: &EventEnvelope) -> Result<()> {
        let payload = envelope.to_bytes()?;
        let channel = self.get_channel().await?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2); // persistent

        let confirm = channel
            .basic_publish(
                &self.settings.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| BrokerError::Publish(format!("Failed to publish: {}", e)))?;

        confirm
            .await
            .map_err(|e| BrokerError::Publish(format!("Publish confirmation failed: {}", e)))?;

        debug!(
            exchange = %self.settings.exchange,
            "Published event envelope"
        );
        Ok(())
    }
}

/// Integration tests requiring a running RabbitMQ instance.
///
/// Run with: AMQP_URL=amqp://localhost:5672 cargo test --features amqp -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::model::EventType;
    use uuid::Uuid;

    fn amqp_url() -> String {
        std::env::var("AMQP_URL").unwrap_or_else(|_| "amqp://localhost:5672".to_string())
    }

    fn make_envelope() -> EventEnvelope {
        EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: EventType::EntityCreation,
            data: serde_json::json!({"name": "sample"}),
            metadata: serde_json::json!({"created_at": "2026-01-01T00:00:00Z"}),
        }
    }

    #[tokio::test]
    #[ignore = "Requires RabbitMQ"]
    async fn test_publish_to_topic_exchange() {
        let broker = AmqpBroker::new(AmqpSettings::new(amqp_url()))
            .await
            .expect("Failed to connect");

        broker
            .publish("entity_creation.acme", &make_envelope())
            .await
            .expect("Failed to publish");
    }

    #[tokio::test]
    #[ignore = "Requires RabbitMQ"]
    async fn test_publish_is_repeatable_across_channels() {
        let broker = AmqpBroker::new(AmqpSettings::new(amqp_url()))
            .await
            .expect("Failed to connect");

        for _ in 0..5 {
            broker
                .publish("entity_status_change.acme", &make_envelope())
                .await
                .expect("Failed to publish");
        }
    }
}
