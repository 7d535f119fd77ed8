use async_trait::async_trait;

use super::{
    AccessStrategy, AccessStrategyError, AccessStrategyRequest, RegisteredServiceAccessStrategy,
    RequiredAttributes,
};
use crate::{
    attributes::merge_multi_valued,
    chain::ChainingPolicy,
    delegated::RegisteredServiceDelegatedAuthenticationPolicy,
};

#[async_trait]
impl AccessStrategy for ChainingPolicy<RegisteredServiceAccessStrategy> {
    fn is_service_access_allowed(&self) -> bool {
        self.evaluate(|s| s.is_service_access_allowed())
    }

    fn is_service_access_allowed_for_sso(&self) -> bool {
        self.evaluate(|s| s.is_service_access_allowed_for_sso())
    }

    /// A child that fails to evaluate counts as a denial from that child, so
    /// an OR chain can still be satisfied by another child.
    async fn authorize_request(
        &self,
        request: &AccessStrategyRequest,
    ) -> Result<bool, AccessStrategyError> {
        for strategy in &self.policies {
            let allowed = match strategy.authorize_request(request).await {
                Ok(allowed) => allowed,
                Err(e) => {
                    tracing::warn!(error = %e, "Chained access strategy failed; counting it as a denial");
                    false
                }
            };
            if self.operator.is_decisive(allowed) {
                return Ok(allowed);
            }
        }
        Ok(self.operator.fold(std::iter::empty()))
    }

    fn required_attributes(&self) -> RequiredAttributes {
        let mut merged = RequiredAttributes::new();
        for strategy in &self.policies {
            merge_multi_valued(&mut merged, &strategy.required_attributes());
        }
        merged
    }

    fn delegated_authentication_policy(
        &self,
    ) -> Option<RegisteredServiceDelegatedAuthenticationPolicy> {
        let children: Vec<_> = self
            .policies
            .iter()
            .filter_map(|s| s.delegated_authentication_policy())
            .collect();
        if children.is_empty() {
            return None;
        }
        Some(RegisteredServiceDelegatedAuthenticationPolicy::Chaining(
            ChainingPolicy::new(self.operator).with_policies(children),
        ))
    }

    fn unauthorized_redirect_url(&self) -> Option<String> {
        self.policies
            .iter()
            .find_map(|s| s.unauthorized_redirect_url())
    }
}
