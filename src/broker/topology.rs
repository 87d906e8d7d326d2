//! Tenant queue topology contract.
//!
//! Queue provisioning lives outside this crate, but the names, bindings,
//! and limits are a contract both sides must agree on. Everything below is
//! deterministic from the tenant's routing name and the configured limits,
//! so provisioning can be re-run idempotently and this core can document
//! exactly where a tenant's messages go.
//!
//! ## Naming
//!
//! | Object            | Name                                  |
//! |-------------------|---------------------------------------|
//! | Exchange          | `relaybox.events` (durable, topic)    |
//! | Tenant queue      | `relaybox.q.{routing_name}`           |
//! | Dead-letter queue | `relaybox.q.{routing_name}.dlq`       |
//! | Binding pattern   | `*.{routing_name}`                    |
//!
//! Routing keys are `{event_type}.{routing_name}`, so the one-wildcard
//! binding delivers every event type addressed to the tenant and nothing
//! else.
//!
//! ## Limits
//!
//! The live queue carries a per-message TTL and a maximum length; messages
//! exceeding either are dead-lettered by the broker to the tenant's DLQ.
//! The defaults (24h TTL, 100k messages) can be overridden via
//! [`TopologyConfig`](crate::config::TopologyConfig), but provisioning and
//! this core must be configured identically: RabbitMQ refuses queue
//! redeclaration with different arguments.

use crate::model::RoutingName;

/// Exchange all events are published to.
pub const EVENTS_EXCHANGE: &str = "relaybox.events";

/// Prefix for per-tenant queues.
pub const QUEUE_PREFIX: &str = "relaybox.q.";

/// Suffix appended to the tenant queue name for its dead-letter queue.
pub const DLQ_SUFFIX: &str = ".dlq";

/// Default per-message TTL in the tenant queue (24 hours).
pub const DEFAULT_MESSAGE_TTL_MS: u64 = 86_400_000;

/// Default maximum tenant queue length.
pub const DEFAULT_MAX_QUEUE_LENGTH: u64 = 100_000;

/// Queue name for a tenant.
pub fn queue_name(routing_name: &RoutingName) -> String {
    format!("{}{}", QUEUE_PREFIX, routing_name)
}

/// Dead-letter queue name for a tenant.
pub fn dlq_name(routing_name: &RoutingName) -> String {
    format!("{}{}{}", QUEUE_PREFIX, routing_name, DLQ_SUFFIX)
}

/// Topic binding pattern for a tenant's queue.
pub fn binding_pattern(routing_name: &RoutingName) -> String {
    format!("*.{}", routing_name)
}

/// Arguments the tenant queue must be declared with so expired or
/// overflowing messages dead-letter into the tenant's DLQ.
///
/// Provisioning declares the DLQ itself as a plain durable queue and binds
/// nothing to it; the broker routes into it directly.
#[cfg(feature = "amqp")]
pub fn queue_arguments(
    routing_name: &RoutingName,
    message_ttl_ms: u64,
    max_queue_length: u64,
) -> lapin::types::FieldTable {
    use lapin::types::{AMQPValue, FieldTable};

    let mut args = FieldTable::default();
    args.insert(
        "x-message-ttl".into(),
        AMQPValue::LongLongInt(message_ttl_ms as i64),
    );
    args.insert(
        "x-max-length".into(),
        AMQPValue::LongLongInt(max_queue_length as i64),
    );
    // Dead-letter through the default exchange straight to the DLQ by name.
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(String::new().into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(dlq_name(routing_name).into()),
    );
    args
}
