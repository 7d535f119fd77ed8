//! Strategies that delegate the principal decision to an external
//! authorization engine over HTTP/JSON.
//!
//! Each engine POSTs a structured request (principal, attributes, service and
//! engine-specific fields resolved through `${...}` placeholders) with an
//! optional bearer token, and reads a single allow/deny signal from the
//! response. Any failure to obtain that signal is a denial.

mod cerbos;
mod opa;
mod openfga;
mod permify;

pub use cerbos::CerbosAccessStrategy;
pub use opa::OpaAccessStrategy;
pub use openfga::OpenFgaAccessStrategy;
pub use permify::PermifyAccessStrategy;

use super::AccessStrategyError;

/// Map an engine outcome to a decision, logging failures.
fn deny_on_error(engine: &str, api_url: &str, result: Result<bool, AccessStrategyError>) -> bool {
    match result {
        Ok(allowed) => {
            tracing::debug!(engine, allowed, "Authorization engine decision");
            allowed
        }
        Err(e) => {
            tracing::error!(engine, api_url = %api_url, error = %e, "Authorization engine call failed; denying access");
            false
        }
    }
}

/// Implements the flag and metadata methods of [`super::AccessStrategy`] by
/// delegating to the strategy's flattened `base` settings.
macro_rules! delegate_base_settings {
    () => {
        fn is_service_access_allowed(&self) -> bool {
            self.base.enabled
        }

        fn is_service_access_allowed_for_sso(&self) -> bool {
            self.base.sso_enabled
        }

        fn delegated_authentication_policy(
            &self,
        ) -> Option<crate::delegated::RegisteredServiceDelegatedAuthenticationPolicy> {
            self.base.delegated_authentication_policy.clone()
        }

        fn unauthorized_redirect_url(&self) -> Option<String> {
            self.base.unauthorized_redirect_url.clone()
        }
    };
}

pub(crate) use delegate_base_settings;
