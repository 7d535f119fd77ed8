use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AccessStrategy, AccessStrategyError, AccessStrategyRequest, RequiredAttributes};
use crate::{
    activation::{ActivationContext, ActivationCriteria, RegisteredServiceActivationCriteria},
    attributes::{AttributeRules, Attributes},
    delegated::RegisteredServiceDelegatedAuthenticationPolicy,
};

fn default_true() -> bool {
    true
}

/// Settings shared by every non-composite strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseAccessStrategy {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub sso_enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unauthorized_redirect_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_authentication_policy: Option<RegisteredServiceDelegatedAuthenticationPolicy>,
}

impl Default for BaseAccessStrategy {
    fn default() -> Self {
        Self {
            enabled: true,
            sso_enabled: true,
            unauthorized_redirect_url: None,
            delegated_authentication_policy: None,
        }
    }
}

impl BaseAccessStrategy {
    pub fn new(enabled: bool, sso_enabled: bool) -> Self {
        Self {
            enabled,
            sso_enabled,
            ..Self::default()
        }
    }
}

/// Attribute-based access strategy.
///
/// Access is granted when the principal carries none of the rejected
/// attribute values and satisfies the required ones (all of them, or any one
/// when `require_all_attributes` is off). Values are literals unless one of
/// them is a regular expression, in which case they are matched as a pattern
/// alternation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultAccessStrategy {
    #[serde(flatten)]
    pub base: BaseAccessStrategy,

    #[serde(default = "default_true")]
    pub require_all_attributes: bool,

    /// Compare attribute values ignoring case.
    #[serde(default)]
    pub case_insensitive: bool,

    #[serde(default, skip_serializing_if = "AttributeRules::is_empty")]
    pub required_attributes: AttributeRules,

    #[serde(default, skip_serializing_if = "AttributeRules::is_empty")]
    pub rejected_attributes: AttributeRules,

    /// When present and inactive, attribute rules are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_criteria: Option<RegisteredServiceActivationCriteria>,
}

impl Default for DefaultAccessStrategy {
    fn default() -> Self {
        Self {
            base: BaseAccessStrategy::default(),
            require_all_attributes: true,
            case_insensitive: false,
            required_attributes: AttributeRules::new(),
            rejected_attributes: AttributeRules::new(),
            activation_criteria: None,
        }
    }
}

impl DefaultAccessStrategy {
    pub fn new(enabled: bool, sso_enabled: bool) -> Self {
        Self {
            base: BaseAccessStrategy::new(enabled, sso_enabled),
            ..Self::default()
        }
    }

    /// A strategy that refuses all access.
    pub fn disabled() -> Self {
        Self::new(false, false)
    }

    pub fn with_required_attributes(mut self, rules: AttributeRules) -> Self {
        self.required_attributes = rules;
        self
    }

    pub fn with_rejected_attributes(mut self, rules: AttributeRules) -> Self {
        self.rejected_attributes = rules;
        self
    }

    pub fn with_require_all_attributes(mut self, require_all: bool) -> Self {
        self.require_all_attributes = require_all;
        self
    }

    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn with_activation_criteria(
        mut self,
        criteria: impl Into<RegisteredServiceActivationCriteria>,
    ) -> Self {
        self.activation_criteria = Some(criteria.into());
        self
    }

    pub fn with_delegated_authentication_policy(
        mut self,
        policy: impl Into<RegisteredServiceDelegatedAuthenticationPolicy>,
    ) -> Self {
        self.base.delegated_authentication_policy = Some(policy.into());
        self
    }

    pub fn with_unauthorized_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.base.unauthorized_redirect_url = Some(url.into());
        self
    }

    /// Evaluate the attribute rules for the principal in `request`.
    pub fn do_principal_attributes_allow_service_access(
        &self,
        request: &AccessStrategyRequest,
    ) -> bool {
        let principal = request.principal_id();
        let attributes = request.attributes();

        if let Some(criteria) = &self.activation_criteria {
            let context = ActivationContext::from_request(request);
            if !criteria.should_activate(&context) {
                let allow = criteria.is_allow_if_inactive();
                tracing::debug!(principal = %principal, allow, "Activation criteria inactive; skipping attribute rules");
                return allow;
            }
        }

        if self.required_attributes.is_empty() && self.rejected_attributes.is_empty() {
            tracing::trace!(principal = %principal, "No attribute rules configured; access granted");
            return true;
        }

        if !self.enough_attributes_available(attributes) {
            tracing::debug!(
                principal = %principal,
                available = attributes.len(),
                required = self.required_attributes.len(),
                "Principal does not carry enough attributes to satisfy the required rules"
            );
            return false;
        }

        if self
            .rejected_attributes
            .any_match(attributes, self.case_insensitive)
        {
            tracing::debug!(principal = %principal, "Principal carries a rejected attribute value");
            return false;
        }

        if self.required_attributes.is_empty() {
            return true;
        }

        let allowed = self.required_attributes.satisfied_by(
            attributes,
            self.require_all_attributes,
            self.case_insensitive,
        );
        if !allowed {
            tracing::debug!(
                principal = %principal,
                require_all = self.require_all_attributes,
                "Principal attributes do not satisfy the required attributes"
            );
        }
        allowed
    }

    /// Size-only pre-check. Only rejects when the full evaluation would also
    /// reject: nothing to match against, or too few keys for `require_all`.
    fn enough_attributes_available(&self, attributes: &Attributes) -> bool {
        if self.required_attributes.is_empty() {
            return true;
        }
        if attributes.is_empty() {
            return false;
        }
        !(self.require_all_attributes && attributes.len() < self.required_attributes.len())
    }
}

#[async_trait]
impl AccessStrategy for DefaultAccessStrategy {
    fn is_service_access_allowed(&self) -> bool {
        if !self.base.enabled {
            tracing::trace!("Service is not enabled in the service registry");
        }
        self.base.enabled
    }

    fn is_service_access_allowed_for_sso(&self) -> bool {
        if !self.base.sso_enabled {
            tracing::trace!("Service is not allowed to participate in SSO");
        }
        self.base.sso_enabled
    }

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        Ok(self.do_principal_attributes_allow_service_access(request))
    }

    fn required_attributes(&self) -> RequiredAttributes {
        self.required_attributes.as_map().clone()
    }

    fn delegated_authentication_policy(
        &self,
    ) -> Option<RegisteredServiceDelegatedAuthenticationPolicy> {
        self.base.delegated_authentication_policy.clone()
    }

    fn unauthorized_redirect_url(&self) -> Option<String> {
        self.base.unauthorized_redirect_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        activation::AttributeActivationCriteria,
        attributes::attributes,
        chain::LogicalOperator,
        registry::Service,
    };

    fn request(attrs: Attributes) -> AccessStrategyRequest {
        AccessStrategyRequest::new(Service::new("https://app.example.org"), "casuser")
            .with_attributes(attrs)
    }

    #[tokio::test]
    async fn test_empty_rules_allow_anyone() {
        let strategy = DefaultAccessStrategy::default();
        assert!(strategy.authorize_request(&request(Attributes::new())).await.unwrap());
        assert!(strategy
            .authorize_request(&request(attributes([("anything", ["at all"])])))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_required_attribute_with_require_all() {
        let strategy = DefaultAccessStrategy::default()
            .with_required_attributes(AttributeRules::new().with_rule("cn", ["cas"]));
        let without = request(attributes([("givenName", ["John"])]));
        assert!(!strategy.authorize_request(&without).await.unwrap());

        let mut attrs = without.attributes().clone();
        attrs.insert("cn".to_string(), vec!["cas".to_string()]);
        let with = without.clone().with_attributes(attrs);
        assert!(strategy.authorize_request(&with).await.unwrap());
    }

    #[tokio::test]
    async fn test_require_any_attribute() {
        let strategy = DefaultAccessStrategy::default()
            .with_require_all_attributes(false)
            .with_required_attributes(
                AttributeRules::new()
                    .with_rule("cn", ["cas"])
                    .with_rule("memberOf", ["admins"]),
            );
        assert!(strategy
            .authorize_request(&request(attributes([("memberOf", ["admins"])])))
            .await
            .unwrap());
        assert!(!strategy
            .authorize_request(&request(attributes([("memberOf", ["staff"])])))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_rejected_attributes_deny() {
        let strategy = DefaultAccessStrategy::default()
            .with_rejected_attributes(AttributeRules::new().with_rule("status", ["lock.*"]));
        assert!(!strategy
            .authorize_request(&request(attributes([("status", ["locked"])])))
            .await
            .unwrap());
        assert!(strategy
            .authorize_request(&request(attributes([("status", ["active"])])))
            .await
            .unwrap());
        assert!(strategy.authorize_request(&request(Attributes::new())).await.unwrap());
    }

    #[tokio::test]
    async fn test_case_insensitive_values() {
        let strategy = DefaultAccessStrategy::default()
            .with_required_attributes(AttributeRules::new().with_rule("cn", ["CAS"]));
        let attrs = request(attributes([("cn", ["cas"])]));
        assert!(!strategy.authorize_request(&attrs).await.unwrap());
        let strategy = strategy.with_case_insensitive(true);
        assert!(strategy.authorize_request(&attrs).await.unwrap());
    }

    /// The size pre-check only rejects where the full evaluation would too.
    #[tokio::test]
    async fn test_cardinality_precheck_is_outcome_preserving() {
        // More required keys than the principal carries, but OR semantics:
        // one matching key is enough, so the pre-check must not reject.
        let strategy = DefaultAccessStrategy::default()
            .with_require_all_attributes(false)
            .with_required_attributes(
                AttributeRules::new()
                    .with_rule("a", ["1"])
                    .with_rule("b", ["2"])
                    .with_rule("c", ["3"]),
            );
        assert!(strategy
            .authorize_request(&request(attributes([("a", ["1"])])))
            .await
            .unwrap());

        // Fewer principal keys than rejected rules never short-circuits.
        let strategy = DefaultAccessStrategy::default()
            .with_required_attributes(AttributeRules::new().with_rule("cn", ["cas"]))
            .with_rejected_attributes(
                AttributeRules::new()
                    .with_rule("x", ["1"])
                    .with_rule("y", ["2"]),
            );
        assert!(strategy
            .authorize_request(&request(attributes([("cn", ["cas"])])))
            .await
            .unwrap());

        // Too few keys under require-all: rejected up front and by the full check.
        let strategy = DefaultAccessStrategy::default().with_required_attributes(
            AttributeRules::new()
                .with_rule("cn", ["cas"])
                .with_rule("uid", ["casuser"]),
        );
        let attrs = attributes([("cn", ["cas"])]);
        assert!(!strategy.enough_attributes_available(&attrs));
        assert!(!strategy.required_attributes.satisfied_by(&attrs, true, false));
    }

    #[tokio::test]
    async fn test_inactive_criteria_skip_rules() {
        let criteria = AttributeActivationCriteria::new(
            AttributeRules::new().with_rule("mfa", ["required"]),
            LogicalOperator::And,
        );
        let strategy = DefaultAccessStrategy::default()
            .with_required_attributes(AttributeRules::new().with_rule("cn", ["cas"]))
            .with_activation_criteria(criteria.clone());

        // Inactive: rules are skipped and access is allowed
        assert!(strategy.authorize_request(&request(Attributes::new())).await.unwrap());

        // Active: rules apply
        let active = request(attributes([("mfa", ["required"])]));
        assert!(!strategy.authorize_request(&active).await.unwrap());

        // Inactive but configured to deny
        let strategy = strategy.with_activation_criteria(criteria.with_allow_if_inactive(false));
        assert!(!strategy.authorize_request(&request(Attributes::new())).await.unwrap());
    }

    #[test]
    fn test_flags() {
        let strategy = DefaultAccessStrategy::new(true, false);
        assert!(strategy.is_service_access_allowed());
        assert!(!strategy.is_service_access_allowed_for_sso());
        let disabled = DefaultAccessStrategy::disabled();
        assert!(!disabled.is_service_access_allowed());
    }

    #[test]
    fn test_flattened_serialization() {
        let strategy = DefaultAccessStrategy::new(false, true)
            .with_unauthorized_redirect_url("https://denied.example.org")
            .with_required_attributes(AttributeRules::new().with_rule("cn", ["cas"]));
        let json = serde_json::to_value(&strategy).unwrap();
        assert_eq!(json["enabled"], false);
        assert_eq!(json["unauthorized_redirect_url"], "https://denied.example.org");
        assert_eq!(json["required_attributes"]["cn"][0], "cas");
        assert!(json.get("rejected_attributes").is_none());

        let back: DefaultAccessStrategy = serde_json::from_value(json).unwrap();
        assert_eq!(back, strategy);
        assert_eq!(
            back.unauthorized_redirect_url().as_deref(),
            Some("https://denied.example.org")
        );
    }
}
