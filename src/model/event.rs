//! The outbox event row.
//!
//! An event is created once by the recording service and never deleted;
//! everything after creation is a status mutation on one of its two
//! lifecycles. The publish lifecycle tracks the hand-off to the broker,
//! the delivery lifecycle tracks the consumer's acknowledgment. The two
//! are independent state machines over the same row: delivery only starts
//! advancing once publish has reached `published` at least once.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Fixed vocabulary of domain events flowing through the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EntityCreation,
    EntityDeletion,
    EntityStatusChange,
}

impl EventType {
    /// Routing-key segment for this event type (lowercase/underscored).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EntityCreation => "entity_creation",
            EventType::EntityDeletion => "entity_deletion",
            EventType::EntityStatusChange => "entity_status_change",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity_creation" => Ok(EventType::EntityCreation),
            "entity_deletion" => Ok(EventType::EntityDeletion),
            "entity_status_change" => Ok(EventType::EntityStatusChange),
            other => Err(UnknownVariant::new("event type", other)),
        }
    }
}

/// Publish lifecycle status.
///
/// Core operations only ever move a row `pending -> published`; failed
/// attempts stay `pending` with a recorded reason so the retry coordinator
/// can pick them up again. `failed` exists for rows parked manually by an
/// operator and is never set by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Pending,
    Published,
    Failed,
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PublishStatus::Pending => "pending",
            PublishStatus::Published => "published",
            PublishStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for PublishStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PublishStatus::Pending),
            "published" => Ok(PublishStatus::Published),
            "failed" => Ok(PublishStatus::Failed),
            other => Err(UnknownVariant::new("publish status", other)),
        }
    }
}

/// Delivery lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(UnknownVariant::new("delivery status", other)),
        }
    }
}

/// A fully materialized outbox row.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub event_id: Uuid,
    pub entity_id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: EventType,
    /// Tag of the internal operation that created the event.
    pub origin: String,
    /// The business fact being announced.
    pub payload: serde_json::Value,
    /// Context carried alongside the payload (correlation ids, timestamps).
    pub metadata: serde_json::Value,
    pub publish_status: PublishStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub publish_attempts: i32,
    pub publish_first_attempt_at: DateTime<Utc>,
    pub publish_last_attempt_at: DateTime<Utc>,
    pub publish_failure_reason: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_attempts: i32,
    pub delivery_last_attempt_at: Option<DateTime<Utc>>,
    pub delivery_failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an outbox row.
///
/// The store fills in the lifecycle fields: publish status `pending` with
/// the attempt count at 1 (creation is the first publish attempt), delivery
/// status `pending` with no attempts yet.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub event_id: Uuid,
    pub entity_id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: EventType,
    pub origin: String,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
}
