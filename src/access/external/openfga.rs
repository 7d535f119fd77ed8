use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{delegate_base_settings, deny_on_error};
use crate::access::{
    AccessStrategy, AccessStrategyError, AccessStrategyRequest, BaseAccessStrategy,
    http::{self, default_timeout_ms},
};

fn default_user() -> String {
    "user:${principal}".to_string()
}

fn default_relation() -> String {
    "owner".to_string()
}

fn default_object() -> String {
    "service:${service}".to_string()
}

/// OpenFGA relationship check: `POST {api_url}/stores/{store_id}/check`.
///
/// `user`, `relation` and `object` form the checked tuple and may contain
/// `${...}` placeholders. Access is granted when the response reports
/// `"allowed": true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenFgaAccessStrategy {
    #[serde(flatten)]
    pub base: BaseAccessStrategy,

    pub api_url: String,

    pub store_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_relation")]
    pub relation: String,

    #[serde(default = "default_object")]
    pub object: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl OpenFgaAccessStrategy {
    pub fn new(api_url: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            base: BaseAccessStrategy::default(),
            api_url: api_url.into(),
            store_id: store_id.into(),
            token: None,
            user: default_user(),
            relation: default_relation(),
            object: default_object(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = relation.into();
        self
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = object.into();
        self
    }

    #[instrument(
        skip(self, request),
        fields(engine = "openfga", api_url = %self.api_url, store = %self.store_id)
    )]
    async fn check(&self, request: &AccessStrategyRequest) -> Result<bool, AccessStrategyError> {
        if self.store_id.trim().is_empty() {
            return Err(AccessStrategyError::configuration("OpenFGA store id is required"));
        }
        let resolver = request.expression_resolver();
        let user = resolver.resolve(&self.user);
        let relation = resolver.resolve(&self.relation);
        let object = resolver.resolve(&self.object);
        let body = CheckRequest {
            tuple_key: TupleKey {
                user: &user,
                relation: &relation,
                object: &object,
            },
        };

        let url = http::join_url(&self.api_url, &format!("stores/{}/check", self.store_id));
        let response: CheckResponse =
            http::post_json(&url, self.token.as_deref(), self.timeout_ms, &body).await?;
        Ok(response.allowed)
    }
}

#[async_trait]
impl AccessStrategy for OpenFgaAccessStrategy {
    delegate_base_settings!();

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        Ok(deny_on_error("openfga", &self.api_url, self.check(request).await))
    }
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    tuple_key: TupleKey<'a>,
}

#[derive(Debug, Serialize)]
struct TupleKey<'a> {
    user: &'a str,
    relation: &'a str,
    object: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    allowed: bool,
}
