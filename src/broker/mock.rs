//! Mock broker implementation for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BrokerError, EventBroker, EventEnvelope, Result};

/// Mock broker that records publishes in memory.
#[derive(Default)]
pub struct MockBroker {
    published: RwLock<Vec<(String, EventEnvelope)>>,
    fail_on_publish: RwLock<bool>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Routing keys seen so far, in publish order.
    pub async fn routing_keys(&self) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub async fn take_published(&self) -> Vec<(String, EventEnvelope)> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventBroker for MockBroker {
    async fn publish(&self, routing_key: &str, envelope: &EventEnvelope) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BrokerError::Connection(
                "Mock publish failure".to_string(),
            ));
        }
        self.published
            .write()
            .await
            .push((routing_key.to_string(), envelope.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;
    use uuid::Uuid;

    fn make_envelope() -> EventEnvelope {
        EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: EventType::EntityCreation,
            data: serde_json::json!({}),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_mock_broker_records_publishes() {
        let broker = MockBroker::new();
        broker
            .publish("entity_creation.acme", &make_envelope())
            .await
            .unwrap();

        assert_eq!(broker.published_count().await, 1);
        assert_eq!(broker.routing_keys().await, vec!["entity_creation.acme"]);
    }

    #[tokio::test]
    async fn test_mock_broker_fail_on_publish() {
        let broker = MockBroker::new();
        broker.set_fail_on_publish(true).await;

        let result = broker.publish("entity_creation.acme", &make_envelope()).await;
        assert!(matches!(result, Err(BrokerError::Connection(_))));
        assert_eq!(broker.published_count().await, 0);
    }
}
