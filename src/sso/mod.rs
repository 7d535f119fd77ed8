//! SSO participation policies decide whether an existing single-sign-on
//! session may satisfy a service without prompting for credentials again.
//!
//! Policies are ordered; a chain sorts its children by `order` (lowest first)
//! before evaluating them so traces are reproducible.

mod attribute;
mod time_window;

pub use attribute::AttributeSsoParticipationPolicy;
use serde::{Deserialize, Serialize};
pub use time_window::{TimeUnit, TimeWindowSsoParticipationPolicy, WindowStart};

use crate::{
    chain::ChainingPolicy,
    registry::RegisteredService,
    script::{ScriptBindings, ScriptResource},
    ticket::TicketState,
};

/// A boolean that may be left unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriStateBoolean {
    #[default]
    Undefined,
    True,
    False,
}

impl TriStateBoolean {
    pub fn is_defined(self) -> bool {
        self != Self::Undefined
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Undefined => None,
            Self::True => Some(true),
            Self::False => Some(false),
        }
    }
}

impl From<bool> for TriStateBoolean {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

pub trait SsoParticipationPolicy: Send + Sync {
    /// Whether `ticket` may be reused for `registered_service`.
    fn should_participate_in_sso(
        &self,
        registered_service: &RegisteredService,
        ticket: &dyn TicketState,
    ) -> bool;

    /// Whether to issue a new SSO cookie after a forced re-authentication.
    fn create_cookie_on_renewed_authentication(&self) -> TriStateBoolean {
        TriStateBoolean::Undefined
    }

    /// Evaluation priority; lower runs first.
    fn order(&self) -> i32 {
        0
    }
}

/// Settings every policy carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoPolicySettings {
    #[serde(default)]
    pub order: i32,

    #[serde(default)]
    pub create_cookie_on_renewed_authentication: TriStateBoolean,
}

/// All supported SSO participation policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisteredServiceSsoParticipationPolicy {
    /// Always participate.
    Default(DefaultSsoParticipationPolicy),
    /// Never participate.
    Never(NeverSsoParticipationPolicy),
    /// Participate until a duration has elapsed since a session timestamp.
    TimeWindow(TimeWindowSsoParticipationPolicy),
    /// Participate when session attributes satisfy patterns.
    Attribute(AttributeSsoParticipationPolicy),
    /// Participate when a script returns `true`.
    Scripted(ScriptedSsoParticipationPolicy),
    /// Child policies combined with AND/OR after sorting by order.
    Chaining(ChainingPolicy<RegisteredServiceSsoParticipationPolicy>),
}

impl Default for RegisteredServiceSsoParticipationPolicy {
    fn default() -> Self {
        Self::Default(DefaultSsoParticipationPolicy::default())
    }
}

macro_rules! impl_from_policy {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for RegisteredServiceSsoParticipationPolicy {
                fn from(policy: $ty) -> Self {
                    Self::$variant(policy)
                }
            }
        )*
    };
}

impl_from_policy! {
    Default => DefaultSsoParticipationPolicy,
    Never => NeverSsoParticipationPolicy,
    TimeWindow => TimeWindowSsoParticipationPolicy,
    Attribute => AttributeSsoParticipationPolicy,
    Scripted => ScriptedSsoParticipationPolicy,
    Chaining => ChainingPolicy<RegisteredServiceSsoParticipationPolicy>,
}

impl RegisteredServiceSsoParticipationPolicy {
    fn as_policy(&self) -> &dyn SsoParticipationPolicy {
        match self {
            Self::Default(p) => p,
            Self::Never(p) => p,
            Self::TimeWindow(p) => p,
            Self::Attribute(p) => p,
            Self::Scripted(p) => p,
            Self::Chaining(p) => p,
        }
    }
}

impl SsoParticipationPolicy for RegisteredServiceSsoParticipationPolicy {
    fn should_participate_in_sso(
        &self,
        registered_service: &RegisteredService,
        ticket: &dyn TicketState,
    ) -> bool {
        self.as_policy()
            .should_participate_in_sso(registered_service, ticket)
    }

    fn create_cookie_on_renewed_authentication(&self) -> TriStateBoolean {
        self.as_policy().create_cookie_on_renewed_authentication()
    }

    fn order(&self) -> i32 {
        self.as_policy().order()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultSsoParticipationPolicy {
    #[serde(flatten)]
    pub settings: SsoPolicySettings,
}

impl SsoParticipationPolicy for DefaultSsoParticipationPolicy {
    fn should_participate_in_sso(&self, _: &RegisteredService, _: &dyn TicketState) -> bool {
        true
    }

    fn create_cookie_on_renewed_authentication(&self) -> TriStateBoolean {
        self.settings.create_cookie_on_renewed_authentication
    }

    fn order(&self) -> i32 {
        self.settings.order
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeverSsoParticipationPolicy {
    #[serde(flatten)]
    pub settings: SsoPolicySettings,
}

impl SsoParticipationPolicy for NeverSsoParticipationPolicy {
    fn should_participate_in_sso(&self, registered_service: &RegisteredService, _: &dyn TicketState) -> bool {
        tracing::debug!(service = %registered_service.name, "Service never participates in SSO");
        false
    }

    fn create_cookie_on_renewed_authentication(&self) -> TriStateBoolean {
        self.settings.create_cookie_on_renewed_authentication
    }

    fn order(&self) -> i32 {
        self.settings.order
    }
}

/// Participates when a script returns `true`; script errors do not.
///
/// Bindings: `principal`, `attributes` (principal and authentication
/// attributes merged), `service` (the registered service id pattern),
/// `countOfUses` (unsigned) and `authenticationDate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedSsoParticipationPolicy {
    #[serde(flatten)]
    pub settings: SsoPolicySettings,

    pub script: ScriptResource,
}

impl ScriptedSsoParticipationPolicy {
    pub fn new(script: ScriptResource) -> Self {
        Self {
            settings: SsoPolicySettings::default(),
            script,
        }
    }
}

impl SsoParticipationPolicy for ScriptedSsoParticipationPolicy {
    fn should_participate_in_sso(
        &self,
        registered_service: &RegisteredService,
        ticket: &dyn TicketState,
    ) -> bool {
        let authentication = ticket.authentication();
        let bindings = ScriptBindings::new()
            .with("principal", &authentication.principal.id)
            .with("attributes", authentication.merged_attributes())
            .with("service", &registered_service.service_id)
            .with("countOfUses", ticket.count_of_uses())
            .with("authenticationDate", authentication.authentication_date.to_rfc3339());
        self.script.evaluate_or_deny(&bindings)
    }

    fn create_cookie_on_renewed_authentication(&self) -> TriStateBoolean {
        self.settings.create_cookie_on_renewed_authentication
    }

    fn order(&self) -> i32 {
        self.settings.order
    }
}

impl ChainingPolicy<RegisteredServiceSsoParticipationPolicy> {
    /// Children sorted by order; ties keep their configured position.
    fn sorted(&self) -> Vec<&RegisteredServiceSsoParticipationPolicy> {
        let mut sorted: Vec<_> = self.policies.iter().collect();
        sorted.sort_by_key(|p| p.order());
        sorted
    }
}

impl SsoParticipationPolicy for ChainingPolicy<RegisteredServiceSsoParticipationPolicy> {
    fn should_participate_in_sso(
        &self,
        registered_service: &RegisteredService,
        ticket: &dyn TicketState,
    ) -> bool {
        let result = self.operator.fold(self.sorted().into_iter().map(|policy| {
            let participate = policy.should_participate_in_sso(registered_service, ticket);
            tracing::trace!(order = policy.order(), participate, "Chained SSO participation policy evaluated");
            participate
        }));
        if !result {
            tracing::debug!(service = %registered_service.name, operator = %self.operator, "SSO participation denied by policy chain");
        }
        result
    }

    fn create_cookie_on_renewed_authentication(&self) -> TriStateBoolean {
        self.sorted()
            .into_iter()
            .map(|p| p.create_cookie_on_renewed_authentication())
            .find(|value| value.is_defined())
            .unwrap_or_default()
    }

    fn order(&self) -> i32 {
        self.policies.iter().map(|p| p.order()).min().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::{
        chain::LogicalOperator,
        ticket::{Authentication, Principal, SessionTicket},
    };

    fn ticket(authenticated_ago: Duration) -> SessionTicket {
        SessionTicket::new(
            "TGT-1",
            Authentication::new(Principal::new("casuser"))
                .with_authentication_date(Utc::now() - authenticated_ago),
        )
    }

    fn window(seconds: i64, order: i32) -> RegisteredServiceSsoParticipationPolicy {
        let mut policy = TimeWindowSsoParticipationPolicy::new(
            WindowStart::LastAuthentication,
            TimeUnit::Seconds,
            seconds,
        );
        policy.settings.order = order;
        policy.into()
    }

    #[test]
    fn test_default_and_never() {
        let service = RegisteredService::new(1, ".*", "any");
        let ticket = ticket(Duration::zero());
        assert!(RegisteredServiceSsoParticipationPolicy::default().should_participate_in_sso(&service, &ticket));
        let never: RegisteredServiceSsoParticipationPolicy = NeverSsoParticipationPolicy::default().into();
        assert!(!never.should_participate_in_sso(&service, &ticket));
    }

    #[test]
    fn test_chained_time_windows() {
        let service = RegisteredService::new(1, ".*", "any");
        let old = ticket(Duration::seconds(120));

        let both_elapsed = ChainingPolicy::new(LogicalOperator::And)
            .with_policy(window(30, 1))
            .with_policy(window(60, 0));
        assert!(!both_elapsed.should_participate_in_sso(&service, &old));

        let both_open = ChainingPolicy::new(LogicalOperator::And)
            .with_policy(window(600, 1))
            .with_policy(window(3600, 0));
        assert!(both_open.should_participate_in_sso(&service, &old));

        let reversed = ChainingPolicy::new(LogicalOperator::And)
            .with_policy(window(3600, 0))
            .with_policy(window(600, 1));
        assert_eq!(
            reversed.should_participate_in_sso(&service, &old),
            both_open.should_participate_in_sso(&service, &old)
        );
    }

    #[test]
    fn test_chain_sorts_by_order() {
        let chain = ChainingPolicy::new(LogicalOperator::And)
            .with_policy(window(10, 5))
            .with_policy(window(10, -1))
            .with_policy(window(10, 2));
        let orders: Vec<i32> = chain.sorted().iter().map(|p| p.order()).collect();
        assert_eq!(orders, vec![-1, 2, 5]);
        assert_eq!(chain.order(), -1);
    }

    #[test]
    fn test_create_cookie_first_defined_in_order() {
        let undefined = DefaultSsoParticipationPolicy::default();
        let mut yes = DefaultSsoParticipationPolicy::default();
        yes.settings = SsoPolicySettings {
            order: 2,
            create_cookie_on_renewed_authentication: TriStateBoolean::True,
        };
        let mut no = NeverSsoParticipationPolicy::default();
        no.settings = SsoPolicySettings {
            order: 1,
            create_cookie_on_renewed_authentication: TriStateBoolean::False,
        };
        let chain = ChainingPolicy::new(LogicalOperator::And)
            .with_policy(undefined.into())
            .with_policy(yes.into())
            .with_policy(no.into());
        assert_eq!(chain.create_cookie_on_renewed_authentication(), TriStateBoolean::False);

        let empty = ChainingPolicy::<RegisteredServiceSsoParticipationPolicy>::default();
        assert_eq!(empty.create_cookie_on_renewed_authentication(), TriStateBoolean::Undefined);
    }

    #[test]
    fn test_tri_state() {
        assert_eq!(TriStateBoolean::from(true).as_bool(), Some(true));
        assert_eq!(TriStateBoolean::Undefined.as_bool(), None);
        assert!(!TriStateBoolean::default().is_defined());
    }

    #[cfg(feature = "cel")]
    #[test]
    fn test_scripted_policy() {
        let service = RegisteredService::new(1, ".*", "any");
        let mut used = ticket(Duration::zero());
        used.count_of_uses = 3;
        let policy = ScriptedSsoParticipationPolicy::new(ScriptResource::inline("countOfUses < 3u"));
        assert!(!policy.should_participate_in_sso(&service, &used));
        let fresh = ticket(Duration::zero());
        assert!(policy.should_participate_in_sso(&service, &fresh));

        let broken = ScriptedSsoParticipationPolicy::new(ScriptResource::inline("unknown > 1"));
        assert!(!broken.should_participate_in_sso(&service, &fresh));
    }

    #[test]
    fn test_round_trip() {
        let policy: RegisteredServiceSsoParticipationPolicy = ChainingPolicy::new(LogicalOperator::And)
            .with_policy(window(60, 1))
            .with_policy(NeverSsoParticipationPolicy::default().into())
            .with_policy(
                AttributeSsoParticipationPolicy::new(false)
                    .with_attribute("memberOf", ["${env.PORTCULLIS_SSO_GROUP}", "admins"])
                    .into(),
            )
            .into();
        let json = serde_json::to_string(&policy).unwrap();
        let back: RegisteredServiceSsoParticipationPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }
}
