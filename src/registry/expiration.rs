use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::datetime::parse_instant;

/// Decides whether a registered service definition has expired.
pub trait ExpirationPolicy {
    fn is_expired(&self) -> bool;
}

/// Expiration settings carried by a registered service.
///
/// Only the expiry check lives here. Acting on expiry (disabling, deleting or
/// notifying) is handled by the registry's lifecycle management.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredServiceExpirationPolicy {
    /// Zoned or local date-time after which the service is expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub delete_when_expired: bool,
    #[serde(default)]
    pub notify_when_expired: bool,
    #[serde(default)]
    pub notify_when_deleted: bool,
}

impl RegisteredServiceExpirationPolicy {
    pub fn expiring_at(expiration_date: impl Into<String>) -> Self {
        Self {
            expiration_date: Some(expiration_date.into()),
            ..Self::default()
        }
    }
}

impl ExpirationPolicy for RegisteredServiceExpirationPolicy {
    fn is_expired(&self) -> bool {
        let Some(date) = self.expiration_date.as_deref().filter(|d| !d.trim().is_empty()) else {
            return false;
        };
        match parse_instant(date, None) {
            Some(expires_at) => Utc::now() > expires_at,
            None => {
                tracing::warn!(expiration_date = %date, "Unparseable expiration date; treating service as not expired");
                false
            }
        }
    }
}
