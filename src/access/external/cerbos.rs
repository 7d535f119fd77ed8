use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::{delegate_base_settings, deny_on_error};
use crate::{
    access::{
        AccessStrategy, AccessStrategyError, AccessStrategyRequest, BaseAccessStrategy,
        http::{self, default_timeout_ms},
    },
    attributes::Attributes,
};

const EFFECT_ALLOW: &str = "EFFECT_ALLOW";

fn default_kind() -> String {
    "service".to_string()
}

fn default_actions() -> Vec<String> {
    vec!["read".to_string(), "write".to_string()]
}

fn default_roles() -> Vec<String> {
    vec!["user".to_string()]
}

/// Cerbos resource check: `POST {api_url}/api/check/resources`.
///
/// The registered service is the resource; access is granted only when every
/// requested action resolves to `EFFECT_ALLOW`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CerbosAccessStrategy {
    #[serde(flatten)]
    pub base: BaseAccessStrategy,

    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Resource kind the policies are written against.
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default = "default_actions")]
    pub actions: Vec<String>,

    /// Principal roles; `${...}` placeholders are resolved per request.
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl CerbosAccessStrategy {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            base: BaseAccessStrategy::default(),
            api_url: api_url.into(),
            token: None,
            kind: default_kind(),
            actions: default_actions(),
            roles: default_roles(),
            scope: None,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    #[instrument(
        skip(self, request),
        fields(engine = "cerbos", api_url = %self.api_url, kind = %self.kind)
    )]
    async fn check(&self, request: &AccessStrategyRequest) -> Result<bool, AccessStrategyError> {
        if self.actions.is_empty() {
            return Err(AccessStrategyError::configuration(
                "Cerbos strategy requires at least one action",
            ));
        }
        let resolver = request.expression_resolver();
        let roles: Vec<String> = self.roles.iter().map(|r| resolver.resolve(r)).collect();
        let scope = self.scope.as_deref().map(|s| resolver.resolve(s));
        let resource_attr = request
            .registered_service()
            .map(|r| {
                BTreeMap::from([
                    ("id", serde_json::json!(r.id)),
                    ("name", serde_json::json!(r.name)),
                ])
            })
            .unwrap_or_default();

        let body = CheckResourcesRequest {
            request_id: Uuid::new_v4().to_string(),
            principal: CerbosPrincipal {
                id: request.principal_id(),
                roles: &roles,
                attr: request.attributes(),
                scope: scope.as_deref(),
            },
            resources: vec![ResourceEntry {
                actions: &self.actions,
                resource: CerbosResource {
                    kind: &self.kind,
                    id: &request.service().id,
                    attr: resource_attr,
                    scope: scope.as_deref(),
                },
            }],
        };

        let url = http::join_url(&self.api_url, "api/check/resources");
        let response: CheckResourcesResponse =
            http::post_json(&url, self.token.as_deref(), self.timeout_ms, &body).await?;

        if response.results.is_empty() {
            return Err(AccessStrategyError::invalid_response(url, "no results returned"));
        }
        Ok(response.results.iter().all(|result| {
            self.actions.iter().all(|action| {
                result
                    .actions
                    .get(action)
                    .is_some_and(|effect| effect == EFFECT_ALLOW)
            })
        }))
    }
}

#[async_trait]
impl AccessStrategy for CerbosAccessStrategy {
    delegate_base_settings!();

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        Ok(deny_on_error("cerbos", &self.api_url, self.check(request).await))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResourcesRequest<'a> {
    request_id: String,
    principal: CerbosPrincipal<'a>,
    resources: Vec<ResourceEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct CerbosPrincipal<'a> {
    id: &'a str,
    roles: &'a [String],
    attr: &'a Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ResourceEntry<'a> {
    actions: &'a [String],
    resource: CerbosResource<'a>,
}

#[derive(Debug, Serialize)]
struct CerbosResource<'a> {
    kind: &'a str,
    id: &'a str,
    attr: BTreeMap<&'static str, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CheckResourcesResponse {
    #[serde(default)]
    results: Vec<ResourceResult>,
}

#[derive(Debug, Deserialize)]
struct ResourceResult {
    /// Action name to effect (`EFFECT_ALLOW`/`EFFECT_DENY`).
    #[serde(default)]
    actions: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    use super::*;
    use crate::access::external::test_support::request;

    fn results(actions: serde_json::Value) -> serde_json::Value {
        json!({
            "requestId": "r-1",
            "results": [{
                "resource": {"id": "https://app.example.org", "kind": "service"},
                "actions": actions
            }]
        })
    }

    #[tokio::test]
    async fn test_unreachable_then_allowed() {
        let server = MockServer::start().await;
        let strategy = CerbosAccessStrategy::new(server.uri()).with_token("cerbos-token");
        assert!(!strategy.authorize_request(&request()).await.unwrap());

        Mock::given(method("POST"))
            .and(path("/api/check/resources"))
            .and(header("Authorization", "Bearer cerbos-token"))
            .and(body_partial_json(json!({
                "principal": {"id": "casuser", "roles": ["user"], "attr": {"memberOf": ["admins"]}},
                "resources": [{
                    "actions": ["read", "write"],
                    "resource": {"kind": "service", "id": "https://app.example.org", "attr": {"id": 42, "name": "App"}}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(results(json!({
                "read": "EFFECT_ALLOW",
                "write": "EFFECT_ALLOW"
            }))))
            .mount(&server)
            .await;

        assert!(strategy.authorize_request(&request()).await.unwrap());
    }

    #[tokio::test]
    async fn test_any_denied_action_denies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(results(json!({
                "read": "EFFECT_ALLOW",
                "write": "EFFECT_DENY"
            }))))
            .mount(&server)
            .await;

        let strategy = CerbosAccessStrategy::new(server.uri());
        assert!(!strategy.authorize_request(&request()).await.unwrap());

        let read_only = CerbosAccessStrategy::new(server.uri()).with_actions(["read"]);
        assert!(read_only.authorize_request(&request()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_action_or_results_denies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(results(json!({
                "read": "EFFECT_ALLOW"
            }))))
            .mount(&server)
            .await;
        let strategy = CerbosAccessStrategy::new(server.uri());
        assert!(!strategy.authorize_request(&request()).await.unwrap());

        let empty = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&empty)
            .await;
        let strategy = CerbosAccessStrategy::new(empty.uri());
        assert!(!strategy.authorize_request(&request()).await.unwrap());
    }
}
