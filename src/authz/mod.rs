//! Enforcement of a registered service's policies on an incoming request.
//!
//! The enforcement flow:
//! 1. Find the registered service whose matching strategy accepts the request
//! 2. Check that the service is enabled and not expired
//! 3. Ask the access strategy whether the principal may use the service
//! 4. When an existing session is reused, check SSO participation
//!
//! Every failure is a typed [`AccessError`] with a stable message code.

mod enforcer;
mod error;

pub use enforcer::{
    AccessStrategyEnforcer, ensure_principal_access_for_authentication,
    ensure_principal_access_is_allowed_for_service, ensure_service_access_is_allowed,
    ensure_service_sso_access_is_allowed,
};
pub use error::AccessError;
