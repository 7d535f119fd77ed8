use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AccessStrategy, AccessStrategyError, AccessStrategyRequest};
use crate::script::{ScriptBindings, ScriptResource};

/// Every access question is answered by a script.
///
/// The script sees `method` (`isServiceAccessAllowed`,
/// `isServiceAccessAllowedForSso` or `authorizeRequest`); for
/// `authorizeRequest` it also sees `principal`, `attributes`, `service` and,
/// when known, `registeredService`. Script failures deny.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedAccessStrategy {
    pub script: ScriptResource,
}

impl ScriptedAccessStrategy {
    pub fn new(script: ScriptResource) -> Self {
        Self { script }
    }

    fn method_bindings(method: &str) -> ScriptBindings {
        ScriptBindings::new().with("method", method)
    }
}

#[async_trait]
impl AccessStrategy for ScriptedAccessStrategy {
    fn is_service_access_allowed(&self) -> bool {
        self.script
            .evaluate_or_deny(&Self::method_bindings("isServiceAccessAllowed"))
    }

    fn is_service_access_allowed_for_sso(&self) -> bool {
        self.script
            .evaluate_or_deny(&Self::method_bindings("isServiceAccessAllowedForSso"))
    }

    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        let mut bindings = Self::method_bindings("authorizeRequest")
            .with("principal", request.principal_id())
            .with("attributes", request.attributes())
            .with("service", &request.service().id);
        if let Some(registered) = request.registered_service() {
            bindings = bindings.with(
                "registeredService",
                serde_json::json!({"id": registered.id, "name": registered.name}),
            );
        }
        Ok(self.script.evaluate_or_deny(&bindings))
    }
}

#[cfg(all(test, feature = "cel"))]
mod tests {
    use super::*;
    use crate::{attributes::attributes, registry::Service};

    #[tokio::test]
    async fn test_script_answers_each_method() {
        let strategy = ScriptedAccessStrategy::new(ScriptResource::inline(
            "method == 'isServiceAccessAllowed' \
             || (method == 'authorizeRequest' && 'admins' in attributes.memberOf)",
        ));
        assert!(strategy.is_service_access_allowed());
        assert!(!strategy.is_service_access_allowed_for_sso());

        let admin = AccessStrategyRequest::new(Service::new("https://app"), "casuser")
            .with_attributes(attributes([("memberOf", ["admins"])]));
        assert!(strategy.authorize_request(&admin).await.unwrap());

        let staff = admin.clone().with_attributes(attributes([("memberOf", ["staff"])]));
        assert!(!strategy.authorize_request(&staff).await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_script_denies() {
        let strategy = ScriptedAccessStrategy::new(ScriptResource::inline("attributes.missing[0] == 'x'"));
        let request = AccessStrategyRequest::new(Service::new("https://app"), "casuser");
        assert!(!strategy.authorize_request(&request).await.unwrap());
        assert!(!strategy.is_service_access_allowed());
    }
}
