use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    AccessStrategy, AccessStrategyError, AccessStrategyRequest, DefaultAccessStrategy,
    RequiredAttributes,
};
use crate::{
    datetime::parse_instant, delegated::RegisteredServiceDelegatedAuthenticationPolicy,
    expression::ExpressionResolver,
};

/// Default access rules, only within a time window.
///
/// Bounds accept zoned (`2030-01-01T10:00:00Z`) and local
/// (`2030-01-01T10:00:00`) date-times and may contain `${...}` placeholders.
/// Local values are read in `zone_id` (an offset or a region such as
/// `Europe/Paris`) when set; zoned values keep their own offset. Either bound
/// may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeBasedAccessStrategy {
    #[serde(flatten)]
    pub base: DefaultAccessStrategy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_date_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_date_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

impl TimeBasedAccessStrategy {
    pub fn new(base: DefaultAccessStrategy) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn with_starting_date_time(mut self, value: impl Into<String>) -> Self {
        self.starting_date_time = Some(value.into());
        self
    }

    pub fn with_ending_date_time(mut self, value: impl Into<String>) -> Self {
        self.ending_date_time = Some(value.into());
        self
    }

    pub fn with_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    /// Whether now falls inside the configured window.
    fn is_within_window(&self, resolver: &ExpressionResolver) -> bool {
        let now = Utc::now();
        let zone = self.zone_id.as_deref();

        if let Some(start) = self.starting_date_time.as_deref().filter(|s| !s.trim().is_empty()) {
            let resolved = resolver.resolve(start);
            match parse_instant(&resolved, zone) {
                Some(starting) if now < starting => {
                    tracing::warn!(starting = %starting, "Service access is not yet permitted");
                    return false;
                }
                Some(_) => {}
                None => {
                    tracing::warn!(value = %resolved, "Unparseable starting date-time; denying access");
                    return false;
                }
            }
        }

        if let Some(end) = self.ending_date_time.as_deref().filter(|s| !s.trim().is_empty()) {
            let resolved = resolver.resolve(end);
            match parse_instant(&resolved, zone) {
                Some(ending) if now > ending => {
                    tracing::warn!(ending = %ending, "Service access is no longer permitted");
                    return false;
                }
                Some(_) => {}
                None => {
                    tracing::warn!(value = %resolved, "Unparseable ending date-time; denying access");
                    return false;
                }
            }
        }

        true
    }
}

#[async_trait]
impl AccessStrategy for TimeBasedAccessStrategy {
    fn is_service_access_allowed(&self) -> bool {
        self.is_within_window(&ExpressionResolver::new()) && self.base.is_service_access_allowed()
    }

    fn is_service_access_allowed_for_sso(&self) -> bool {
        self.base.is_service_access_allowed_for_sso()
    }

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        if !self.is_within_window(&request.expression_resolver()) {
            return Ok(false);
        }
        self.base.authorize_request(request).await
    }

    fn required_attributes(&self) -> RequiredAttributes {
        self.base.required_attributes()
    }

    fn delegated_authentication_policy(
        &self,
    ) -> Option<RegisteredServiceDelegatedAuthenticationPolicy> {
        self.base.delegated_authentication_policy()
    }

    fn unauthorized_redirect_url(&self) -> Option<String> {
        self.base.unauthorized_redirect_url()
    }
}
