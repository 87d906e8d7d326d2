//! Message broker seam for event publication.
//!
//! This module contains:
//! - `EventBroker` trait: hand a serialized event to the broker under a
//!   routing key
//! - `EventEnvelope`: the JSON wire message consumers receive
//! - Routing-key construction and the queue topology contract
//! - Implementations: AMQP (RabbitMQ, feature `amqp`), Mock

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{EventType, OutboxEvent, RoutingName};

pub mod mock;
pub mod topology;

#[cfg(feature = "amqp")]
pub mod amqp;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpBroker, AmqpSettings};
pub use mock::MockBroker;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur while talking to the broker.
///
/// All variants are transient from the pipeline's point of view: the event
/// row stays durably recorded and eligible for retry, so none of these is
/// ever surfaced to the caller that recorded the event.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Publish timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to serialize message: {0}")]
    Serialization(String),
}

/// Build the routing key for an event: `{event_type}.{routing_name}`.
///
/// Both segments are lowercase/underscored by construction (`EventType` is
/// a closed vocabulary, `RoutingName` is validated), so the key is always
/// safe for topic-exchange matching.
pub fn routing_key(event_type: EventType, routing_name: &RoutingName) -> String {
    format!("{}.{}", event_type, routing_name)
}

/// JSON wire message for one event.
///
/// The payload travels under `data` and the event's creation time rides in
/// `metadata.created_at`, alongside whatever context was recorded with the
/// event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub metadata: serde_json::Value,
}

impl EventEnvelope {
    /// Build the envelope for an outbox row.
    pub fn from_event(event: &OutboxEvent) -> Self {
        let mut metadata = match &event.metadata {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("context".to_string(), other.clone());
                map
            }
        };
        metadata.insert(
            "created_at".to_string(),
            serde_json::Value::String(event.created_at.to_rfc3339()),
        );

        Self {
            event_id: event.event_id,
            event_type: event.event_type,
            data: event.payload.clone(),
            metadata: serde_json::Value::Object(metadata),
        }
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BrokerError::Serialization(e.to_string()))
    }
}

/// Interface for handing events to the broker.
///
/// Implementations:
/// - `AmqpBroker`: RabbitMQ topic exchange via lapin
/// - `MockBroker`: in-memory recorder for testing
///
/// A publish returning `Ok` means the broker accepted the message; it says
/// nothing about consumer delivery, which is tracked separately through
/// acknowledgment receipts.
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Publish one envelope under the given routing key.
    async fn publish(&self, routing_key: &str, envelope: &EventEnvelope) -> Result<()>;
}
