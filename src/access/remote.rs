use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{
    AccessStrategy, AccessStrategyError, AccessStrategyRequest, DefaultAccessStrategy,
    RequiredAttributes,
    http::{self, default_timeout_ms},
};
use crate::delegated::RegisteredServiceDelegatedAuthenticationPolicy;

fn default_accepted_response_codes() -> String {
    "200,202".to_string()
}

/// Default access rules followed by a `GET {endpoint_url}?username={principal}`.
///
/// The principal is allowed when the endpoint answers with one of the
/// accepted status codes. Connection failures and timeouts deny.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEndpointAccessStrategy {
    #[serde(flatten)]
    pub base: DefaultAccessStrategy,

    pub endpoint_url: String,

    /// Comma-separated list of status codes that grant access.
    #[serde(default = "default_accepted_response_codes")]
    pub accepted_response_codes: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RemoteEndpointAccessStrategy {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            base: DefaultAccessStrategy::default(),
            endpoint_url: endpoint_url.into(),
            accepted_response_codes: default_accepted_response_codes(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_base(mut self, base: DefaultAccessStrategy) -> Self {
        self.base = base;
        self
    }

    pub fn with_accepted_response_codes(mut self, codes: impl Into<String>) -> Self {
        self.accepted_response_codes = codes.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn accepted_codes(&self) -> Vec<u16> {
        self.accepted_response_codes
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .filter_map(|code| match code.parse::<u16>() {
                Ok(code) => Some(code),
                Err(_) => {
                    tracing::warn!(code = %code, "Ignoring invalid accepted response code");
                    None
                }
            })
            .collect()
    }

    #[instrument(
        skip(self, request),
        fields(strategy = "remote_endpoint", url = %self.endpoint_url, principal = %request.principal_id())
    )]
    async fn call_endpoint(&self, request: &AccessStrategyRequest) -> Result<bool, AccessStrategyError> {
        let status = http::get_status(
            &self.endpoint_url,
            &[("username", request.principal_id())],
            self.timeout_ms,
        )
        .await?;
        let allowed = self.accepted_codes().contains(&status.as_u16());
        tracing::debug!(status = status.as_u16(), allowed, "Remote endpoint responded");
        Ok(allowed)
    }
}

#[async_trait]
impl AccessStrategy for RemoteEndpointAccessStrategy {
    fn is_service_access_allowed(&self) -> bool {
        self.base.is_service_access_allowed()
    }

    fn is_service_access_allowed_for_sso(&self) -> bool {
        self.base.is_service_access_allowed_for_sso()
    }

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        if !self.base.do_principal_attributes_allow_service_access(request) {
            return Ok(false);
        }
        match self.call_endpoint(request).await {
            Ok(allowed) => Ok(allowed),
            Err(e) => {
                tracing::error!(url = %self.endpoint_url, error = %e, "Remote endpoint check failed; denying access");
                Ok(false)
            }
        }
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
