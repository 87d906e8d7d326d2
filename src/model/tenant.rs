//! Tenants (consumers) and their routing names.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

/// Maximum routing name length. Broker object names embed the routing name,
/// so the bound keeps queue/DLQ names well under AMQP's 255-byte limit.
pub const MAX_ROUTING_NAME_LEN: usize = 64;

/// Error for routing names that violate the naming contract.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoutingNameError {
    #[error("routing name must not be empty")]
    Empty,

    #[error("routing name exceeds {MAX_ROUTING_NAME_LEN} characters")]
    TooLong,

    #[error("routing name '{0}' contains characters outside [a-z0-9_]")]
    InvalidCharacter(String),
}

/// A tenant's immutable routing name.
///
/// The name is used verbatim in broker object names (routing keys, queue
/// names, DLQ names), so the character set is restricted to `[a-z0-9_]`.
/// There is no mutation API: once a tenant's queue is bound to this name,
/// renaming would orphan the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoutingName(String);

impl RoutingName {
    /// Validate and wrap a routing name.
    pub fn new(name: impl Into<String>) -> Result<Self, RoutingNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RoutingNameError::Empty);
        }
        if name.len() > MAX_ROUTING_NAME_LEN {
            return Err(RoutingNameError::TooLong);
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(RoutingNameError::InvalidCharacter(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoutingName {
    type Error = RoutingNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoutingName> for String {
    fn from(name: RoutingName) -> Self {
        name.0
    }
}

/// Tenant lifecycle status. Only `active` tenants may record events or
/// receive publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deactivated,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Deactivated => "deactivated",
        };
        f.write_str(s)
    }
}

impl FromStr for TenantStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "deactivated" => Ok(TenantStatus::Deactivated),
            other => Err(UnknownVariant::new("tenant status", other)),
        }
    }
}

/// A consumer identity. Rows are provisioned outside this crate; the core
/// only reads them to resolve routing names and authorize operations.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub routing_name: RoutingName,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}
