//! Broker hand-off for a single event.
//!
//! One `attempt` is one bounded unit of work: build the envelope, resolve
//! the routing key, and try the broker under a hard timeout. Transient
//! failures inside the window are retried with capped exponential backoff
//! and jitter; once the window closes the attempt is over and the caller
//! records the outcome on the row. Attempt *counting* is not done here:
//! creation counts the first attempt and the retry coordinator counts the
//! rest, so a crash mid-publish can never under-count.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::debug;

use crate::broker::{routing_key, BrokerError, EventBroker, EventEnvelope};
use crate::model::{OutboxEvent, RoutingName};

/// Retries within a single bounded attempt window.
const MAX_RETRIES: usize = 2;

/// Publishes one event to the broker within a bounded window.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn EventBroker>,
    timeout: Duration,
}

impl EventPublisher {
    /// Create a publisher with the given per-attempt timeout.
    pub fn new(broker: Arc<dyn EventBroker>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    /// Attempt to hand the event to the broker.
    ///
    /// Never blocks past the configured timeout; a broker outage degrades
    /// to an error the caller records on the row, not a hung request.
    pub async fn attempt(
        &self,
        event: &OutboxEvent,
        routing_name: &RoutingName,
    ) -> crate::broker::Result<()> {
        let key = routing_key(event.event_type, routing_name);
        let envelope = EventEnvelope::from_event(event);

        match tokio::time::timeout(self.timeout, self.publish_with_backoff(&key, &envelope)).await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.timeout.as_secs())),
        }
    }

    /// Publish with capped exponential backoff and jitter inside the window.
    async fn publish_with_backoff(
        &self,
        key: &str,
        envelope: &EventEnvelope,
    ) -> crate::broker::Result<()> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_millis(500))
            .with_max_times(MAX_RETRIES)
            .with_jitter()
            .build();

        let mut last_error = None;

        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            match self.broker.publish(key, envelope).await {
                Ok(()) => {
                    debug!(routing_key = %key, "Event handed to broker");
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        attempt = attempt + 1,
                        error = %e,
                        routing_key = %key,
                        "Broker publish failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| BrokerError::Publish("publish attempts exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBroker;
    use crate::model::{DeliveryStatus, EventType, PublishStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_event() -> OutboxEvent {
        let now = Utc::now();
        OutboxEvent {
            event_id: Uuid::new_v4(),
            entity_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            event_type: EventType::EntityDeletion,
            origin: "delete_entity".to_string(),
            payload: serde_json::json!({"name": "sample"}),
            metadata: serde_json::Value::Null,
            publish_status: PublishStatus::Pending,
            published_at: None,
            publish_attempts: 1,
            publish_first_attempt_at: now,
            publish_last_attempt_at: now,
            publish_failure_reason: None,
            delivery_status: DeliveryStatus::Pending,
            delivered_at: None,
            delivery_attempts: 0,
            delivery_last_attempt_at: None,
            delivery_failure_reason: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_attempt_publishes_under_tenant_key() {
        let broker = Arc::new(MockBroker::new());
        let publisher = EventPublisher::new(broker.clone(), Duration::from_secs(5));
        let name = crate::model::RoutingName::new("acme").unwrap();

        publisher.attempt(&sample_event(), &name).await.unwrap();

        assert_eq!(broker.routing_keys().await, vec!["entity_deletion.acme"]);
    }

    #[tokio::test]
    async fn test_attempt_reports_broker_failure() {
        let broker = Arc::new(MockBroker::new());
        broker.set_fail_on_publish(true).await;
        let publisher = EventPublisher::new(broker.clone(), Duration::from_secs(5));
        let name = crate::model::RoutingName::new("acme").unwrap();

        let result = publisher.attempt(&sample_event(), &name).await;
        assert!(result.is_err());
        assert_eq!(broker.published_count().await, 0);
    }

    struct StalledBroker;

    #[async_trait]
    impl EventBroker for StalledBroker {
        async fn publish(
            &self,
            _routing_key: &str,
            _envelope: &EventEnvelope,
        ) -> crate::broker::Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_attempt_is_bounded_by_timeout() {
        let publisher = EventPublisher::new(Arc::new(StalledBroker), Duration::from_millis(50));
        let name = crate::model::RoutingName::new("acme").unwrap();

        let start = std::time::Instant::now();
        let result = publisher.attempt(&sample_event(), &name).await;

        assert!(matches!(result, Err(BrokerError::Timeout(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
