//! Domain model: outbox events, tenants, credentials, delivery receipts.
//!
//! All status vocabularies are closed enums stored as lowercase text.

mod credential;
mod event;
mod receipt;
mod tenant;

pub use credential::{Credential, CredentialStatus};
pub use event::{DeliveryStatus, EventType, NewOutboxEvent, OutboxEvent, PublishStatus};
pub use receipt::{DeliveryReceipt, ReceiptOutcome};
pub use tenant::{RoutingName, RoutingNameError, Tenant, TenantStatus};

/// Error for parsing a closed vocabulary from text.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
