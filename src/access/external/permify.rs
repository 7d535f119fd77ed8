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
    expression::ExpressionResolver,
};

const CHECK_RESULT_ALLOWED: &str = "CHECK_RESULT_ALLOWED";

fn default_tenant() -> String {
    "t1".to_string()
}

fn default_entity_type() -> String {
    "service".to_string()
}

fn default_entity_id() -> String {
    "${registeredService.id}".to_string()
}

fn default_permission() -> String {
    "access".to_string()
}

fn default_subject_type() -> String {
    "user".to_string()
}

fn default_depth() -> u32 {
    20
}

/// Permify permission check:
/// `POST {api_url}/v1/tenants/{tenant}/permissions/check`.
///
/// Access is granted when the response's `can` field equals
/// `CHECK_RESULT_ALLOWED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermifyAccessStrategy {
    #[serde(flatten)]
    pub base: BaseAccessStrategy,

    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_tenant")]
    pub tenant: String,

    #[serde(default = "default_entity_type")]
    pub entity_type: String,

    /// Entity id; `${...}` placeholders are resolved per request and one left
    /// unresolved denies.
    #[serde(default = "default_entity_id")]
    pub entity_id: String,

    #[serde(default = "default_permission")]
    pub permission: String,

    #[serde(default = "default_subject_type")]
    pub subject_type: String,

    #[serde(default = "default_depth")]
    pub depth: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl PermifyAccessStrategy {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            base: BaseAccessStrategy::default(),
            api_url: api_url.into(),
            token: None,
            tenant: default_tenant(),
            entity_type: default_entity_type(),
            entity_id: default_entity_id(),
            permission: default_permission(),
            subject_type: default_subject_type(),
            depth: default_depth(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self.entity_id = entity_id.into();
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = permission.into();
        self
    }

    #[instrument(
        skip(self, request),
        fields(engine = "permify", api_url = %self.api_url, tenant = %self.tenant)
    )]
    async fn check(&self, request: &AccessStrategyRequest) -> Result<bool, AccessStrategyError> {
        let resolver = request.expression_resolver();
        let entity_id = resolver.resolve(&self.entity_id);
        let permission = resolver.resolve(&self.permission);
        if ExpressionResolver::has_placeholder(&entity_id) {
            return Err(AccessStrategyError::configuration(format!(
                "Permify entity id '{entity_id}' has unresolved placeholders"
            )));
        }

        let body = PermissionCheckRequest {
            metadata: CheckMetadata {
                snap_token: "",
                schema_version: "",
                depth: self.depth,
            },
            entity: Entity {
                r#type: &self.entity_type,
                id: &entity_id,
            },
            permission: &permission,
            subject: Subject {
                r#type: &self.subject_type,
                id: request.principal_id(),
                relation: "",
            },
            context: CheckContext {
                data: ContextData {
                    principal: request.principal_id(),
                    service: &request.service().id,
                    attributes: request.attributes(),
                },
            },
        };

        let url = http::join_url(
            &self.api_url,
            &format!("v1/tenants/{}/permissions/check", self.tenant),
        );
        let response: PermissionCheckResponse =
            http::post_json(&url, self.token.as_deref(), self.timeout_ms, &body).await?;
        Ok(response.can == CHECK_RESULT_ALLOWED)
    }
}

#[async_trait]
impl AccessStrategy for PermifyAccessStrategy {
    delegate_base_settings!();

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        Ok(deny_on_error("permify", &self.api_url, self.check(request).await))
    }
}

#[derive(Debug, Serialize)]
struct PermissionCheckRequest<'a> {
    metadata: CheckMetadata<'a>,
    entity: Entity<'a>,
    permission: &'a str,
    subject: Subject<'a>,
    context: CheckContext<'a>,
}

#[derive(Debug, Serialize)]
struct CheckMetadata<'a> {
    snap_token: &'a str,
    schema_version: &'a str,
    depth: u32,
}

#[derive(Debug, Serialize)]
struct Entity<'a> {
    r#type: &'a str,
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct Subject<'a> {
    r#type: &'a str,
    id: &'a str,
    relation: &'a str,
}

#[derive(Debug, Serialize)]
struct CheckContext<'a> {
    data: ContextData<'a>,
}

#[derive(Debug, Serialize)]
struct ContextData<'a> {
    principal: &'a str,
    service: &'a str,
    attributes: &'a Attributes,
}

#[derive(Debug, Deserialize)]
struct PermissionCheckResponse {
    #[serde(default)]
    can: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    use super::*;
    use crate::access::external::test_support::request;

    #[tokio::test]
    async fn test_unreachable_then_allowed() {
        let server = MockServer::start().await;
        let strategy = PermifyAccessStrategy::new(server.uri());
        assert!(!strategy.authorize_request(&request()).await.unwrap());

        Mock::given(method("POST"))
            .and(path("/v1/tenants/t1/permissions/check"))
            .and(body_partial_json(json!({
                "metadata": {"depth": 20},
                "entity": {"type": "service", "id": "42"},
                "permission": "access",
                "subject": {"type": "user", "id": "casuser"},
                "context": {"data": {"principal": "casuser", "attributes": {"memberOf": ["admins"]}}}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"can": "CHECK_RESULT_ALLOWED", "metadata": {"check_count": 1}})),
            )
            .mount(&server)
            .await;

        assert!(strategy.authorize_request(&request()).await.unwrap());
    }

    #[tokio::test]
    async fn test_denied_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tenants/acme/permissions/check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"can": "CHECK_RESULT_DENIED"})))
            .mount(&server)
            .await;
        let strategy = PermifyAccessStrategy::new(server.uri()).with_tenant("acme");
        assert!(!strategy.authorize_request(&request()).await.unwrap());
        assert!(!strategy.check(&request()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unresolved_entity_id_denies_without_calling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"can": "CHECK_RESULT_ALLOWED"})))
            .expect(0)
            .mount(&server)
            .await;
        let strategy = PermifyAccessStrategy::new(server.uri());
        let unregistered = AccessStrategyRequest::new(
            crate::registry::Service::new("https://app.example.org"),
            "casuser",
        );
        assert!(!strategy.authorize_request(&unregistered).await.unwrap());
        assert!(matches!(
            strategy.check(&unregistered).await,
            Err(AccessStrategyError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_no_server_denies() {
        let strategy = PermifyAccessStrategy::new("http://127.0.0.1:1");
        assert!(!strategy.authorize_request(&request()).await.unwrap());
    }
}
