//! Session (ticket-granting ticket) state consumed by SSO decisions.
//!
//! Ticket issuance and storage live elsewhere; this module only describes the
//! state that access control reads from an existing session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;

/// The authenticated identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Outcome of a completed authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    pub principal: Principal,
    /// Attributes describing the authentication event itself (method,
    /// credential type, MFA context, ...).
    #[serde(default)]
    pub attributes: Attributes,
    pub authentication_date: DateTime<Utc>,
}

impl Authentication {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            attributes: Attributes::new(),
            authentication_date: Utc::now(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_authentication_date(mut self, date: DateTime<Utc>) -> Self {
        self.authentication_date = date;
        self
    }

    /// Principal attributes overlaid with authentication attributes.
    pub fn merged_attributes(&self) -> Attributes {
        let mut merged = self.principal.attributes.clone();
        merged.extend(self.attributes.clone());
        merged
    }
}

/// Read access to an existing single-sign-on session.
pub trait TicketState: Send + Sync {
    fn id(&self) -> &str;
    fn authentication(&self) -> &Authentication;
    fn creation_time(&self) -> DateTime<Utc>;
    fn last_time_used(&self) -> Option<DateTime<Utc>>;
    fn count_of_uses(&self) -> u32;
    /// Identifier of the service that proxied this session, if any.
    fn proxied_by(&self) -> Option<&str>;
}

/// In-memory session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTicket {
    pub id: String,
    pub authentication: Authentication,
    pub creation_time: DateTime<Utc>,
    #[serde(default)]
    pub last_time_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count_of_uses: u32,
    #[serde(default)]
    pub proxied_by: Option<String>,
}

impl SessionTicket {
    pub fn new(id: impl Into<String>, authentication: Authentication) -> Self {
        Self {
            id: id.into(),
            creation_time: authentication.authentication_date,
            authentication,
            last_time_used: None,
            count_of_uses: 0,
            proxied_by: None,
        }
    }

    pub fn with_last_time_used(mut self, last_time_used: DateTime<Utc>) -> Self {
        self.last_time_used = Some(last_time_used);
        self
    }

    pub fn with_count_of_uses(mut self, count: u32) -> Self {
        self.count_of_uses = count;
        self
    }

    pub fn with_proxied_by(mut self, service: impl Into<String>) -> Self {
        self.proxied_by = Some(service.into());
        self
    }

    /// Record a use of this session.
    pub fn update(&mut self) {
        self.last_time_used = Some(Utc::now());
        self.count_of_uses += 1;
    }
}

impl TicketState for SessionTicket {
    fn id(&self) -> &str {
        &self.id
    }

    fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    fn last_time_used(&self) -> Option<DateTime<Utc>> {
        self.last_time_used
    }

    fn count_of_uses(&self) -> u32 {
        self.count_of_uses
    }

    fn proxied_by(&self) -> Option<&str> {
        self.proxied_by.as_deref()
    }
}
