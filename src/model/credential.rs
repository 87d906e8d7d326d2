//! Tenant API credentials.
//!
//! Credential rows are written by tenant provisioning; this core only reads
//! them so authentication collaborators can resolve the single active key
//! for a tenant. Secrets are stored hashed, never plaintext.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Expired,
    Deactivated,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Expired => "expired",
            CredentialStatus::Deactivated => "deactivated",
        };
        f.write_str(s)
    }
}

impl FromStr for CredentialStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CredentialStatus::Active),
            "expired" => Ok(CredentialStatus::Expired),
            "deactivated" => Ok(CredentialStatus::Deactivated),
            other => Err(UnknownVariant::new("credential status", other)),
        }
    }
}

/// An API key row. At most one `active` credential exists per tenant.
#[derive(Debug, Clone)]
pub struct Credential {
    pub credential_id: Uuid,
    pub tenant_id: Uuid,
    pub secret_hash: String,
    pub status: CredentialStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_status_round_trip() {
        for status in [
            CredentialStatus::Active,
            CredentialStatus::Expired,
            CredentialStatus::Deactivated,
        ] {
            assert_eq!(
                status.to_string().parse::<CredentialStatus>().unwrap(),
                status
            );
        }
    }
}
