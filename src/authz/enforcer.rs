use std::sync::Arc;

use tracing::instrument;

use super::AccessError;
use crate::{
    access::{AccessStrategy, AccessStrategyRequest},
    attributes::Attributes,
    registry::{ExpirationPolicy, RegisteredService, Service, ServiceRegistry},
    sso::SsoParticipationPolicy,
    ticket::{Authentication, TicketState},
};

/// Fails unless `registered_service` exists, its access strategy allows
/// access and it has not expired. Expiry is only checked once access is
/// allowed.
pub fn ensure_service_access_is_allowed(
    service: &str,
    registered_service: Option<&RegisteredService>,
) -> Result<(), AccessError> {
    let Some(registered_service) = registered_service else {
        tracing::warn!(service = %service, "Service is not found in the service registry");
        return Err(AccessError::unauthorized_service(
            service,
            "service is not registered",
        ));
    };

    let strategy = &registered_service.access_strategy;
    if !strategy.is_service_access_allowed() {
        tracing::warn!(
            service = %service,
            registered_service = %registered_service.name,
            "Service is not enabled in the service registry"
        );
        return Err(AccessError::UnauthorizedService {
            service: service.to_string(),
            message: "service is not enabled".to_string(),
            redirect_url: strategy.unauthorized_redirect_url(),
        });
    }

    if registered_service.expiration_policy.is_expired() {
        tracing::warn!(
            service = %service,
            registered_service = %registered_service.name,
            "Registered service has expired"
        );
        return Err(AccessError::expired_service(service));
    }
    Ok(())
}

/// Decides whether an existing SSO session may be reused for `service`.
///
/// A session that has never been used, or a request carrying fresh
/// credentials, is always let through. Proxied sessions are only logged.
pub fn ensure_service_sso_access_is_allowed(
    registered_service: &RegisteredService,
    service: &Service,
    ticket: &dyn TicketState,
    credentials_provided: bool,
) -> Result<(), AccessError> {
    let reused_without_credentials = ticket.count_of_uses() > 0 && !credentials_provided;

    if !registered_service.access_strategy.is_service_access_allowed_for_sso() {
        tracing::debug!(service = %service.id, "Service is configured to not use SSO");
        if let Some(proxied_by) = ticket.proxied_by() {
            tracing::warn!(
                service = %service.id,
                proxied_by = %proxied_by,
                "Service does not allow SSO but the session was proxied"
            );
        }
        if reused_without_credentials {
            tracing::warn!(
                service = %service.id,
                ticket = %ticket.id(),
                uses = ticket.count_of_uses(),
                "Service does not allow SSO; credentials are required"
            );
            return Err(AccessError::unauthorized_sso(&service.id));
        }
    }

    if reused_without_credentials
        && !registered_service
            .sso_participation_policy
            .should_participate_in_sso(registered_service, ticket)
    {
        tracing::warn!(
            service = %service.id,
            ticket = %ticket.id(),
            "Session does not satisfy the service's SSO participation policy"
        );
        return Err(AccessError::unauthorized_sso(&service.id));
    }

    tracing::debug!(
        service = %service.id,
        ticket = %ticket.id(),
        "Session may participate in SSO for service"
    );
    Ok(())
}

/// Asks the service's access strategy whether `principal_id` with
/// `attributes` may use the service. An evaluation failure denies.
pub async fn ensure_principal_access_is_allowed_for_service(
    service: &Service,
    registered_service: &Arc<RegisteredService>,
    principal_id: &str,
    attributes: &Attributes,
) -> Result<(), AccessError> {
    let request = AccessStrategyRequest::new(service.clone(), principal_id)
        .with_registered_service(Arc::clone(registered_service))
        .with_attributes(attributes.clone());

    let allowed = match registered_service
        .access_strategy
        .authorize_request(&request)
        .await
    {
        Ok(allowed) => allowed,
        Err(e) => {
            tracing::warn!(
                service = %service.id,
                principal = %principal_id,
                error = %e,
                "Access strategy could not be evaluated; denying"
            );
            false
        }
    };

    if allowed {
        return Ok(());
    }
    tracing::warn!(
        service = %service.id,
        principal = %principal_id,
        "Principal is not authorized to access service"
    );
    Err(AccessError::principal_not_authorized(
        principal_id,
        &service.id,
        attributes.clone(),
    ))
}

/// Same as [`ensure_principal_access_is_allowed_for_service`], using the
/// principal and authentication attributes together. Authentication
/// attributes win on a name collision.
pub async fn ensure_principal_access_for_authentication(
    service: &Service,
    registered_service: &Arc<RegisteredService>,
    authentication: &Authentication,
) -> Result<(), AccessError> {
    ensure_principal_access_is_allowed_for_service(
        service,
        registered_service,
        &authentication.principal.id,
        &authentication.merged_attributes(),
    )
    .await
}

/// Runs every enforcement step for a request against a service registry.
#[derive(Clone)]
pub struct AccessStrategyEnforcer {
    registry: Arc<dyn ServiceRegistry>,
}

impl AccessStrategyEnforcer {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }

    /// Looks up the definition for `service`, then checks service access,
    /// principal access and, when a session is being reused, SSO.
    ///
    /// Every decision is recorded on the `audit` target.
    #[instrument(skip_all, fields(service = %service.id, principal = %authentication.principal.id))]
    pub async fn enforce(
        &self,
        service: &Service,
        authentication: &Authentication,
        ticket: Option<&dyn TicketState>,
        credentials_provided: bool,
    ) -> Result<Arc<RegisteredService>, AccessError> {
        let result = self
            .evaluate(service, authentication, ticket, credentials_provided)
            .await;

        match &result {
            Ok(registered_service) => tracing::info!(
                target: "audit",
                service = %service.id,
                registered_service = registered_service.id,
                principal = %authentication.principal.id,
                outcome = "allowed",
                "Access decision"
            ),
            Err(e) => tracing::info!(
                target: "audit",
                service = %service.id,
                principal = %authentication.principal.id,
                outcome = "denied",
                code = e.code(),
                reason = %e,
                "Access decision"
            ),
        }
        result
    }

    async fn evaluate(
        &self,
        service: &Service,
        authentication: &Authentication,
        ticket: Option<&dyn TicketState>,
        credentials_provided: bool,
    ) -> Result<Arc<RegisteredService>, AccessError> {
        let registered_service = self.registry.find_service(&service.id);
        ensure_service_access_is_allowed(&service.id, registered_service.as_deref())?;
        let Some(registered_service) = registered_service else {
            return Err(AccessError::unauthorized_service(
                &service.id,
                "service is not registered",
            ));
        };

        ensure_principal_access_for_authentication(service, &registered_service, authentication).await?;

        if let Some(ticket) = ticket {
            ensure_service_sso_access_is_allowed(&registered_service, service, ticket, credentials_provided)?;
        }
        Ok(registered_service)
    }
}
