//! Access strategies: whether a service is enabled, whether it takes part in
//! single sign-on, and whether a given principal may use it.
//!
//! Every strategy is a serializable value embedded in a registered service.
//! Strategies that consult remote systems (the remote endpoint and the
//! external authorization engines) never fail the authentication pipeline:
//! transport errors, timeouts and malformed responses are logged and treated
//! as a denial.
//!
//! # Example
//!
//! ```toml
//! [services.access_strategy]
//! type = "chaining"
//! operator = "or"
//!
//! [[services.access_strategy.policies]]
//! type = "default"
//! required_attributes = { memberOf = ["admins"] }
//!
//! [[services.access_strategy.policies]]
//! type = "opa"
//! api_url = "http://localhost:8181"
//! decision = "sso/allow"
//! ```

mod chaining;
mod default;
mod error;
mod external;
mod http;
mod remote;
mod request;
mod scripted;
mod time;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
pub use default::{BaseAccessStrategy, DefaultAccessStrategy};
pub use error::AccessStrategyError;
pub use external::{
    CerbosAccessStrategy, OpaAccessStrategy, OpenFgaAccessStrategy, PermifyAccessStrategy,
};
pub use remote::RemoteEndpointAccessStrategy;
pub use request::AccessStrategyRequest;
pub use scripted::ScriptedAccessStrategy;
use serde::{Deserialize, Serialize};
pub use time::TimeBasedAccessStrategy;

use crate::{chain::ChainingPolicy, delegated::RegisteredServiceDelegatedAuthenticationPolicy};

/// Attribute name to the set of acceptable values.
pub type RequiredAttributes = BTreeMap<String, BTreeSet<String>>;

/// Decides whether a service may be used, and by whom.
#[async_trait]
pub trait AccessStrategy: Send + Sync {
    /// Whether the service is enabled at all.
    fn is_service_access_allowed(&self) -> bool;

    /// Whether an existing single-sign-on session may satisfy the service.
    fn is_service_access_allowed_for_sso(&self) -> bool;

    /// Whether the principal described by `request` may access the service.
    ///
    /// An `Err` means the strategy could not reach a decision; callers
    /// treat it as a denial.
    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError>;

    /// Attribute requirements, for audit and introspection.
    fn required_attributes(&self) -> RequiredAttributes {
        RequiredAttributes::new()
    }

    fn delegated_authentication_policy(
        &self,
    ) -> Option<RegisteredServiceDelegatedAuthenticationPolicy> {
        None
    }

    /// Where to send the user when access is denied.
    fn unauthorized_redirect_url(&self) -> Option<String> {
        None
    }
}

/// All supported access strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisteredServiceAccessStrategy {
    /// Enabled/SSO flags plus required and rejected attribute rules.
    Default(DefaultAccessStrategy),
    /// Default rules restricted to a time window.
    TimeBased(TimeBasedAccessStrategy),
    /// Default rules plus an HTTP GET to a remote endpoint.
    RemoteEndpoint(RemoteEndpointAccessStrategy),
    /// Open Policy Agent decision.
    Opa(OpaAccessStrategy),
    /// OpenFGA relationship check.
    #[serde(rename = "openfga")]
    OpenFga(OpenFgaAccessStrategy),
    /// Cerbos resource check.
    Cerbos(CerbosAccessStrategy),
    /// Permify permission check.
    Permify(PermifyAccessStrategy),
    /// Every method answered by a script.
    Scripted(ScriptedAccessStrategy),
    /// Child strategies combined with AND/OR.
    Chaining(ChainingPolicy<RegisteredServiceAccessStrategy>),
}

impl Default for RegisteredServiceAccessStrategy {
    fn default() -> Self {
        Self::Default(DefaultAccessStrategy::default())
    }
}

macro_rules! impl_from_strategy {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for RegisteredServiceAccessStrategy {
                fn from(strategy: $ty) -> Self {
                    Self::$variant(strategy)
                }
            }
        )*
    };
}

impl_from_strategy! {
    Default => DefaultAccessStrategy,
    TimeBased => TimeBasedAccessStrategy,
    RemoteEndpoint => RemoteEndpointAccessStrategy,
    Opa => OpaAccessStrategy,
    OpenFga => OpenFgaAccessStrategy,
    Cerbos => CerbosAccessStrategy,
    Permify => PermifyAccessStrategy,
    Scripted => ScriptedAccessStrategy,
    Chaining => ChainingPolicy<RegisteredServiceAccessStrategy>,
}

impl RegisteredServiceAccessStrategy {
    fn as_strategy(&self) -> &dyn AccessStrategy {
        match self {
            Self::Default(s) => s,
            Self::TimeBased(s) => s,
            Self::RemoteEndpoint(s) => s,
            Self::Opa(s) => s,
            Self::OpenFga(s) => s,
            Self::Cerbos(s) => s,
            Self::Permify(s) => s,
            Self::Scripted(s) => s,
            Self::Chaining(s) => s,
        }
    }
}

#[async_trait]
impl AccessStrategy for RegisteredServiceAccessStrategy {
    fn is_service_access_allowed(&self) -> bool {
        self.as_strategy().is_service_access_allowed()
    }

    fn is_service_access_allowed_for_sso(&self) -> bool {
        self.as_strategy().is_service_access_allowed_for_sso()
    }

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        self.as_strategy().authorize_request(request).await
    }

    fn required_attributes(&self) -> RequiredAttributes {
        self.as_strategy().required_attributes()
    }

    fn delegated_authentication_policy(
        &self,
    ) -> Option<RegisteredServiceDelegatedAuthenticationPolicy> {
        self.as_strategy().delegated_authentication_policy()
    }

    fn unauthorized_redirect_url(&self) -> Option<String> {
        self.as_strategy().unauthorized_redirect_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attributes::{AttributeRules, attributes},
        chain::LogicalOperator,
        registry::Service,
    };

    fn request(attrs: crate::attributes::Attributes) -> AccessStrategyRequest {
        AccessStrategyRequest::new(Service::new("https://app.example.org"), "casuser")
            .with_attributes(attrs)
    }

    /// Every variant, configured with something other than defaults.
    fn sample_strategies() -> Vec<RegisteredServiceAccessStrategy> {
        let default = DefaultAccessStrategy::default()
            .with_required_attributes(AttributeRules::new().with_rule("cn", ["cas"]))
            .with_rejected_attributes(AttributeRules::new().with_rule("status", ["locked"]));
        vec![
            default.clone().into(),
            TimeBasedAccessStrategy::new(default.clone())
                .with_starting_date_time("2001-01-01T00:00:00Z")
                .with_ending_date_time("2999-01-01T00:00:00")
                .with_zone_id("UTC")
                .into(),
            RemoteEndpointAccessStrategy::new("http://127.0.0.1:1/check")
                .with_accepted_response_codes("200")
                .into(),
            OpaAccessStrategy::new("http://127.0.0.1:1", "sso/allow")
                .with_token("opa-token")
                .into(),
            OpenFgaAccessStrategy::new("http://127.0.0.1:1", "store-1")
                .with_relation("viewer")
                .into(),
            CerbosAccessStrategy::new("http://127.0.0.1:1")
                .with_actions(["read"])
                .into(),
            PermifyAccessStrategy::new("http://127.0.0.1:1").with_tenant("t2").into(),
            ScriptedAccessStrategy::new(crate::script::ScriptResource::inline("true")).into(),
            ChainingPolicy::new(LogicalOperator::Or)
                .with_policy(default.into())
                .with_policy(DefaultAccessStrategy::disabled().into())
                .into(),
        ]
    }

    #[test]
    fn test_round_trip_every_variant() {
        for strategy in sample_strategies() {
            let json = serde_json::to_string(&strategy).unwrap();
            let back: RegisteredServiceAccessStrategy = serde_json::from_str(&json).unwrap();
            assert_eq!(strategy, back, "round trip changed {json}");

            let toml_text = toml::to_string(&strategy).unwrap();
            let from_toml: RegisteredServiceAccessStrategy = toml::from_str(&toml_text).unwrap();
            assert_eq!(strategy, from_toml, "toml round trip changed {toml_text}");
        }
    }

    #[tokio::test]
    async fn test_round_trip_preserves_decisions() {
        let allowed = request(attributes([("cn", ["cas"])]));
        let rejected = request(attributes([("cn", vec!["cas"]), ("status", vec!["locked"])]));

        for strategy in sample_strategies() {
            let json = serde_json::to_string(&strategy).unwrap();
            let back: RegisteredServiceAccessStrategy = serde_json::from_str(&json).unwrap();

            assert_eq!(
                strategy.is_service_access_allowed(),
                back.is_service_access_allowed()
            );
            assert_eq!(
                strategy.is_service_access_allowed_for_sso(),
                back.is_service_access_allowed_for_sso()
            );
            for req in [&allowed, &rejected] {
                assert_eq!(
                    strategy.authorize_request(req).await.unwrap_or(false),
                    back.authorize_request(req).await.unwrap_or(false),
                    "decision changed for {json}"
                );
            }
        }
    }

    #[test]
    fn test_tagged_representation() {
        let strategy: RegisteredServiceAccessStrategy = serde_json::from_str(
            r#"{"type": "openfga", "api_url": "http://fga", "store_id": "s1"}"#,
        )
        .unwrap();
        assert!(matches!(strategy, RegisteredServiceAccessStrategy::OpenFga(_)));

        let default: RegisteredServiceAccessStrategy =
            serde_json::from_str(r#"{"type": "default"}"#).unwrap();
        assert_eq!(default, RegisteredServiceAccessStrategy::default());
        assert!(default.is_service_access_allowed());
        assert!(default.is_service_access_allowed_for_sso());
    }
}
