//! Enforcement failures.

use thiserror::Error;

use crate::attributes::Attributes;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessError {
    #[error("Service {service} is not authorized: {message}")]
    UnauthorizedService {
        service: String,
        message: String,
        /// Where the caller should send the user instead, if configured.
        redirect_url: Option<String>,
    },

    #[error("Service {service} has expired")]
    ExpiredService { service: String },

    #[error("Service {service} may not reuse the existing SSO session")]
    UnauthorizedSso { service: String },

    #[error("Principal {principal} is not authorized to access {service}")]
    PrincipalNotAuthorized {
        principal: String,
        service: String,
        attributes: Attributes,
    },
}

impl AccessError {
    pub fn unauthorized_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnauthorizedService {
            service: service.into(),
            message: message.into(),
            redirect_url: None,
        }
    }

    pub fn expired_service(service: impl Into<String>) -> Self {
        Self::ExpiredService {
            service: service.into(),
        }
    }

    pub fn unauthorized_sso(service: impl Into<String>) -> Self {
        Self::UnauthorizedSso {
            service: service.into(),
        }
    }

    pub fn principal_not_authorized(
        principal: impl Into<String>,
        service: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        Self::PrincipalNotAuthorized {
            principal: principal.into(),
            service: service.into(),
            attributes,
        }
    }

    /// Stable message code for selecting user-facing text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnauthorizedService { .. } => "screen.service.error.message",
            Self::ExpiredService { .. } => "screen.service.expired.message",
            Self::UnauthorizedSso { .. } => "screen.service.sso.error.message",
            Self::PrincipalNotAuthorized { .. } => "service.not.authorized.for.principal",
        }
    }

    /// SSO refusals only block silent session reuse; the caller may still
    /// prompt for fresh credentials.
    pub fn allows_credential_prompt(&self) -> bool {
        matches!(self, Self::UnauthorizedSso { .. })
    }
}
