use std::sync::Arc;

use crate::{
    attributes::Attributes,
    expression::ExpressionResolver,
    registry::{RegisteredService, Service},
};

/// Everything a strategy needs to authorize one principal for one service.
///
/// Built fresh for every check and never mutated; `with_*` methods produce a
/// new request.
#[derive(Debug, Clone)]
pub struct AccessStrategyRequest {
    service: Service,
    registered_service: Option<Arc<RegisteredService>>,
    principal_id: String,
    attributes: Attributes,
}

impl AccessStrategyRequest {
    pub fn new(service: Service, principal_id: impl Into<String>) -> Self {
        Self {
            service,
            registered_service: None,
            principal_id: principal_id.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_registered_service(mut self, registered_service: Arc<RegisteredService>) -> Self {
        self.registered_service = Some(registered_service);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn registered_service(&self) -> Option<&RegisteredService> {
        self.registered_service.as_deref()
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Placeholder resolver exposing `principal`, `service`,
    /// `registeredService.id`, `registeredService.name` and
    /// `attributes.<name>`.
    pub fn expression_resolver(&self) -> ExpressionResolver {
        let mut resolver = ExpressionResolver::new()
            .with_variable("principal", self.principal_id.as_str())
            .with_variable("service", self.service.id.as_str())
            .with_attributes(&self.attributes);
        if let Some(registered) = &self.registered_service {
            resolver = resolver
                .with_variable("registeredService.id", registered.id.to_string())
                .with_variable("registeredService.name", registered.name.as_str());
        }
        resolver
    }
}
