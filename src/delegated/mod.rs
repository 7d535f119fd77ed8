//! Which external identity providers a service accepts for delegated
//! authentication.

use serde::{Deserialize, Serialize};

use crate::{chain::ChainingPolicy, registry::RegisteredService};

fn default_true() -> bool {
    true
}

pub trait DelegatedAuthenticationPolicy {
    fn allowed_providers(&self) -> Vec<String>;

    /// Only the allowed providers may be used, and the server's own login
    /// form is not offered.
    fn is_exclusive(&self) -> bool;

    /// Whether a provider is allowed when none are configured.
    fn is_permit_undefined(&self) -> bool;

    fn is_provider_allowed(&self, provider: &str, registered_service: &RegisteredService) -> bool;

    /// Whether delegation to one of the allowed providers is mandatory.
    fn is_provider_required(&self) -> bool;

    /// Whether the policy is exclusive to exactly `provider`.
    fn is_exclusive_to_provider(&self, provider: &str) -> bool;

    /// Named strategy for choosing among several allowed providers.
    fn selection_strategy(&self) -> Option<String>;
}

/// All supported delegated-authentication policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisteredServiceDelegatedAuthenticationPolicy {
    Default(DefaultDelegatedAuthenticationPolicy),
    Chaining(ChainingPolicy<RegisteredServiceDelegatedAuthenticationPolicy>),
}

impl Default for RegisteredServiceDelegatedAuthenticationPolicy {
    fn default() -> Self {
        Self::Default(DefaultDelegatedAuthenticationPolicy::default())
    }
}

impl From<DefaultDelegatedAuthenticationPolicy> for RegisteredServiceDelegatedAuthenticationPolicy {
    fn from(policy: DefaultDelegatedAuthenticationPolicy) -> Self {
        Self::Default(policy)
    }
}

impl From<ChainingPolicy<RegisteredServiceDelegatedAuthenticationPolicy>>
    for RegisteredServiceDelegatedAuthenticationPolicy
{
    fn from(chain: ChainingPolicy<RegisteredServiceDelegatedAuthenticationPolicy>) -> Self {
        Self::Chaining(chain)
    }
}

impl RegisteredServiceDelegatedAuthenticationPolicy {
    fn as_policy(&self) -> &dyn DelegatedAuthenticationPolicy {
        match self {
            Self::Default(p) => p,
            Self::Chaining(p) => p,
        }
    }
}

impl DelegatedAuthenticationPolicy for RegisteredServiceDelegatedAuthenticationPolicy {
    fn allowed_providers(&self) -> Vec<String> {
        self.as_policy().allowed_providers()
    }

    fn is_exclusive(&self) -> bool {
        self.as_policy().is_exclusive()
    }

    fn is_permit_undefined(&self) -> bool {
        self.as_policy().is_permit_undefined()
    }

    fn is_provider_allowed(&self, provider: &str, registered_service: &RegisteredService) -> bool {
        self.as_policy()
            .is_provider_allowed(provider, registered_service)
    }

    fn is_provider_required(&self) -> bool {
        self.as_policy().is_provider_required()
    }

    fn is_exclusive_to_provider(&self, provider: &str) -> bool {
        self.as_policy().is_exclusive_to_provider(provider)
    }

    fn selection_strategy(&self) -> Option<String> {
        self.as_policy().selection_strategy()
    }
}

/// An allow-list of provider names.
///
/// An empty list allows every provider and logs a warning on each check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultDelegatedAuthenticationPolicy {
    #[serde(default)]
    pub allowed_providers: Vec<String>,

    #[serde(default = "default_true")]
    pub permit_undefined: bool,

    #[serde(default)]
    pub exclusive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_strategy: Option<String>,
}

impl Default for DefaultDelegatedAuthenticationPolicy {
    fn default() -> Self {
        Self {
            allowed_providers: Vec::new(),
            permit_undefined: true,
            exclusive: false,
            selection_strategy: None,
        }
    }
}

impl DefaultDelegatedAuthenticationPolicy {
    pub fn new<I, S>(allowed_providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_providers: allowed_providers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn with_selection_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.selection_strategy = Some(strategy.into());
        self
    }
}

impl DelegatedAuthenticationPolicy for DefaultDelegatedAuthenticationPolicy {
    fn allowed_providers(&self) -> Vec<String> {
        self.allowed_providers.clone()
    }

    fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    fn is_permit_undefined(&self) -> bool {
        self.permit_undefined
    }

    fn is_provider_allowed(&self, provider: &str, registered_service: &RegisteredService) -> bool {
        if self.allowed_providers.is_empty() {
            tracing::warn!(
                service = %registered_service.name,
                provider = %provider,
                "No allowed providers are defined for delegated authentication; allowing all. \
                 Define the allowed providers for this service to restrict delegation."
            );
            return true;
        }
        self.allowed_providers.iter().any(|p| p == provider)
    }

    fn is_provider_required(&self) -> bool {
        self.exclusive && !self.allowed_providers.is_empty()
    }

    fn is_exclusive_to_provider(&self, provider: &str) -> bool {
        self.exclusive && self.allowed_providers.len() == 1 && self.allowed_providers[0] == provider
    }

    fn selection_strategy(&self) -> Option<String> {
        self.selection_strategy
            .clone()
            .filter(|s| !s.trim().is_empty())
    }
}

impl DelegatedAuthenticationPolicy for ChainingPolicy<RegisteredServiceDelegatedAuthenticationPolicy> {
    /// Union of every child's providers, in first-seen order.
    fn allowed_providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = Vec::new();
        for provider in self.policies.iter().flat_map(|p| p.allowed_providers()) {
            if !providers.contains(&provider) {
                providers.push(provider);
            }
        }
        providers
    }

    fn is_exclusive(&self) -> bool {
        self.evaluate(|p| p.is_exclusive())
    }

    fn is_permit_undefined(&self) -> bool {
        self.evaluate(|p| p.is_permit_undefined())
    }

    fn is_provider_allowed(&self, provider: &str, registered_service: &RegisteredService) -> bool {
        self.evaluate(|p| p.is_provider_allowed(provider, registered_service))
    }

    fn is_provider_required(&self) -> bool {
        self.evaluate(|p| p.is_provider_required())
    }

    fn is_exclusive_to_provider(&self, provider: &str) -> bool {
        self.evaluate(|p| p.is_exclusive_to_provider(provider))
    }

    fn selection_strategy(&self) -> Option<String> {
        self.policies.iter().find_map(|p| p.selection_strategy())
    }
}
