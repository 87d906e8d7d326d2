//! Consumer acknowledgment receipts.
//!
//! Receipt rows are append-only: duplicate acknowledgments for the same
//! (event, tenant) pair each get their own row for audit, while the event
//! row's delivery status is advanced at most once.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{EventType, UnknownVariant};

/// Outcome reported by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptOutcome {
    Received,
    Processed,
    Failed,
}

impl ReceiptOutcome {
    /// Whether this outcome settles the event as delivered.
    pub fn is_success(&self) -> bool {
        matches!(self, ReceiptOutcome::Received | ReceiptOutcome::Processed)
    }
}

impl fmt::Display for ReceiptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReceiptOutcome::Received => "received",
            ReceiptOutcome::Processed => "processed",
            ReceiptOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for ReceiptOutcome {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(ReceiptOutcome::Received),
            "processed" => Ok(ReceiptOutcome::Processed),
            "failed" => Ok(ReceiptOutcome::Failed),
            other => Err(UnknownVariant::new("receipt outcome", other)),
        }
    }
}

/// Audit record of one acknowledgment call.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub receipt_id: Uuid,
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    /// Denormalized from the event row so receipts are auditable standalone.
    pub event_type: EventType,
    pub outcome: ReceiptOutcome,
    pub failure_reason: Option<String>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_round_trip() {
        for outcome in [
            ReceiptOutcome::Received,
            ReceiptOutcome::Processed,
            ReceiptOutcome::Failed,
        ] {
            assert_eq!(
                outcome.to_string().parse::<ReceiptOutcome>().unwrap(),
                outcome
            );
        }
        assert!("acked".parse::<ReceiptOutcome>().is_err());
    }

    #[test]
    fn test_success_outcomes() {
        assert!(ReceiptOutcome::Received.is_success());
        assert!(ReceiptOutcome::Processed.is_success());
        assert!(!ReceiptOutcome::Failed.is_success());
    }
}
