//! Registered service definitions and the registry that holds them.

mod expiration;
mod store;

use std::cmp::Ordering;

pub use expiration::{ExpirationPolicy, RegisteredServiceExpirationPolicy};
use serde::{Deserialize, Serialize};
pub use store::{InMemoryServiceRegistry, ServiceRegistry};

use crate::{
    access::RegisteredServiceAccessStrategy,
    attributes::Attributes,
    matching::{MatchingStrategy, RegisteredServiceMatchingStrategy},
    sso::RegisteredServiceSsoParticipationPolicy,
    username::RegisteredServiceUsernameProvider,
};

/// The service presented by an incoming authentication request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Identifier used for matching (usually the normalized URL).
    pub id: String,
    /// URL exactly as presented by the client.
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Service {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            original_url: id.clone(),
            id,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Configuration record for one client application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredService {
    /// Numeric surrogate id.
    pub id: i64,
    /// Identifier pattern interpreted by the matching strategy.
    pub service_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lower values are evaluated first when several definitions could match.
    #[serde(default)]
    pub evaluation_order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default)]
    pub matching_strategy: RegisteredServiceMatchingStrategy,
    #[serde(default)]
    pub access_strategy: RegisteredServiceAccessStrategy,
    #[serde(default)]
    pub sso_participation_policy: RegisteredServiceSsoParticipationPolicy,
    #[serde(default)]
    pub expiration_policy: RegisteredServiceExpirationPolicy,
    #[serde(default)]
    pub username_provider: RegisteredServiceUsernameProvider,
}

impl RegisteredService {
    pub fn new(id: i64, service_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            service_id: service_id.into(),
            name: name.into(),
            description: None,
            evaluation_order: 0,
            theme: None,
            matching_strategy: RegisteredServiceMatchingStrategy::default(),
            access_strategy: RegisteredServiceAccessStrategy::default(),
            sso_participation_policy: RegisteredServiceSsoParticipationPolicy::default(),
            expiration_policy: RegisteredServiceExpirationPolicy::default(),
            username_provider: RegisteredServiceUsernameProvider::default(),
        }
    }

    pub fn with_evaluation_order(mut self, order: i32) -> Self {
        self.evaluation_order = order;
        self
    }

    pub fn with_matching_strategy(mut self, strategy: RegisteredServiceMatchingStrategy) -> Self {
        self.matching_strategy = strategy;
        self
    }

    pub fn with_access_strategy(mut self, strategy: impl Into<RegisteredServiceAccessStrategy>) -> Self {
        self.access_strategy = strategy.into();
        self
    }

    pub fn with_sso_participation_policy(
        mut self,
        policy: impl Into<RegisteredServiceSsoParticipationPolicy>,
    ) -> Self {
        self.sso_participation_policy = policy.into();
        self
    }

    pub fn with_expiration_policy(mut self, policy: RegisteredServiceExpirationPolicy) -> Self {
        self.expiration_policy = policy;
        self
    }

    pub fn with_username_provider(mut self, provider: RegisteredServiceUsernameProvider) -> Self {
        self.username_provider = provider;
        self
    }

    /// Whether `service_id` belongs to this definition.
    pub fn matches(&self, service_id: &str) -> bool {
        self.matching_strategy.matches(self, service_id)
    }

    /// Registry ordering: evaluation order, then name, then id.
    pub fn evaluation_cmp(&self, other: &Self) -> Ordering {
        self.evaluation_order
            .cmp(&other.evaluation_order)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.id.cmp(&other.id))
    }
}
