use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{delegate_base_settings, deny_on_error};
use crate::{
    access::{
        AccessStrategy, AccessStrategyError, AccessStrategyRequest, BaseAccessStrategy,
        http::{self, default_timeout_ms},
    },
    attributes::Attributes,
};

/// Open Policy Agent: `POST {api_url}/v1/data/{decision}`.
///
/// The request carries `{"input": {...}}`; access is granted when the
/// response is `{"result": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaAccessStrategy {
    #[serde(flatten)]
    pub base: BaseAccessStrategy,

    pub api_url: String,

    /// Policy path of the decision, e.g. `sso/allow`.
    pub decision: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Extra input values; `${...}` placeholders are resolved per request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl OpaAccessStrategy {
    pub fn new(api_url: impl Into<String>, decision: impl Into<String>) -> Self {
        Self {
            base: BaseAccessStrategy::default(),
            api_url: api_url.into(),
            decision: decision.into(),
            token: None,
            context: BTreeMap::new(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_context(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[instrument(
        skip(self, request),
        fields(engine = "opa", api_url = %self.api_url, decision = %self.decision)
    )]
    async fn check(&self, request: &AccessStrategyRequest) -> Result<bool, AccessStrategyError> {
        let resolver = request.expression_resolver();
        let context: BTreeMap<String, String> = self
            .context
            .iter()
            .map(|(k, v)| (k.clone(), resolver.resolve(v)))
            .collect();

        let body = OpaRequest {
            input: OpaInput {
                principal: request.principal_id(),
                attributes: request.attributes(),
                service: &request.service().id,
                registered_service: request.registered_service().map(|r| RegisteredServiceRef {
                    id: r.id,
                    name: &r.name,
                }),
                context,
            },
        };

        let url = http::join_url(
            &self.api_url,
            &format!("v1/data/{}", self.decision.trim_matches('/')),
        );
        let response: OpaResponse =
            http::post_json(&url, self.token.as_deref(), self.timeout_ms, &body).await?;
        Ok(response.result == Some(serde_json::Value::Bool(true)))
    }
}

#[async_trait]
impl AccessStrategy for OpaAccessStrategy {
    delegate_base_settings!();

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        Ok(deny_on_error("opa", &self.api_url, self.check(request).await))
    }
}

#[derive(Debug, Serialize)]
struct OpaRequest<'a> {
    input: OpaInput<'a>,
}

#[derive(Debug, Serialize)]
struct OpaInput<'a> {
    principal: &'a str,
    attributes: &'a Attributes,
    service: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    registered_service: Option<RegisteredServiceRef<'a>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct RegisteredServiceRef<'a> {
    id: i64,
    name: &'a str,
}

/// `result` is absent when the decision is undefined.
#[derive(Debug, Deserialize)]
struct OpaResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
}
