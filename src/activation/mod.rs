//! Activation criteria decide whether a rule applies to the current request.
//!
//! An inactive rule is skipped; `is_allow_if_inactive` tells the owner what
//! to answer instead.

use serde::{Deserialize, Serialize};

use crate::{
    access::AccessStrategyRequest,
    attributes::{AttributeRules, Attributes},
    chain::{ChainingPolicy, LogicalOperator},
    registry::Service,
    script::{ScriptBindings, ScriptResource},
};

fn default_true() -> bool {
    true
}

/// What activation criteria are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ActivationContext<'a> {
    pub principal_id: &'a str,
    pub attributes: &'a Attributes,
    pub service: Option<&'a Service>,
}

impl<'a> ActivationContext<'a> {
    pub fn new(principal_id: &'a str, attributes: &'a Attributes) -> Self {
        Self {
            principal_id,
            attributes,
            service: None,
        }
    }

    pub fn with_service(mut self, service: &'a Service) -> Self {
        self.service = Some(service);
        self
    }

    pub fn from_request(request: &'a AccessStrategyRequest) -> Self {
        Self::new(request.principal_id(), request.attributes()).with_service(request.service())
    }
}

pub trait ActivationCriteria {
    fn should_activate(&self, context: &ActivationContext<'_>) -> bool;

    /// The answer to give when the criteria do not activate.
    fn is_allow_if_inactive(&self) -> bool;
}

/// All supported activation criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisteredServiceActivationCriteria {
    Attribute(AttributeActivationCriteria),
    Scripted(ScriptedActivationCriteria),
    Chaining(ChainingPolicy<RegisteredServiceActivationCriteria>),
}

impl From<AttributeActivationCriteria> for RegisteredServiceActivationCriteria {
    fn from(criteria: AttributeActivationCriteria) -> Self {
        Self::Attribute(criteria)
    }
}

impl From<ScriptedActivationCriteria> for RegisteredServiceActivationCriteria {
    fn from(criteria: ScriptedActivationCriteria) -> Self {
        Self::Scripted(criteria)
    }
}

impl From<ChainingPolicy<RegisteredServiceActivationCriteria>> for RegisteredServiceActivationCriteria {
    fn from(chain: ChainingPolicy<RegisteredServiceActivationCriteria>) -> Self {
        Self::Chaining(chain)
    }
}

impl RegisteredServiceActivationCriteria {
    fn as_criteria(&self) -> &dyn ActivationCriteria {
        match self {
            Self::Attribute(c) => c,
            Self::Scripted(c) => c,
            Self::Chaining(c) => c,
        }
    }
}

impl ActivationCriteria for RegisteredServiceActivationCriteria {
    fn should_activate(&self, context: &ActivationContext<'_>) -> bool {
        self.as_criteria().should_activate(context)
    }

    fn is_allow_if_inactive(&self) -> bool {
        self.as_criteria().is_allow_if_inactive()
    }
}

/// Activates when the attributes satisfy the configured rules.
///
/// `operator = "and"` requires every configured attribute to match; `"or"`
/// needs one. `reverse_match` negates the whole result: the criteria then
/// activate only when the rules are not satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeActivationCriteria {
    #[serde(default)]
    pub required_attributes: AttributeRules,

    #[serde(default)]
    pub operator: LogicalOperator,

    #[serde(default)]
    pub reverse_match: bool,

    #[serde(default)]
    pub case_insensitive: bool,

    #[serde(default = "default_true")]
    pub allow_if_inactive: bool,
}

impl AttributeActivationCriteria {
    pub fn new(required_attributes: AttributeRules, operator: LogicalOperator) -> Self {
        Self {
            required_attributes,
            operator,
            reverse_match: false,
            case_insensitive: false,
            allow_if_inactive: true,
        }
    }

    pub fn with_reverse_match(mut self, reverse_match: bool) -> Self {
        self.reverse_match = reverse_match;
        self
    }

    pub fn with_allow_if_inactive(mut self, allow: bool) -> Self {
        self.allow_if_inactive = allow;
        self
    }
}

impl ActivationCriteria for AttributeActivationCriteria {
    fn should_activate(&self, context: &ActivationContext<'_>) -> bool {
        let matched = self.required_attributes.satisfied_by(
            context.attributes,
            self.operator == LogicalOperator::And,
            self.case_insensitive,
        );
        let active = matched != self.reverse_match;
        tracing::trace!(principal = %context.principal_id, matched, reverse = self.reverse_match, active, "Attribute activation criteria evaluated");
        active
    }

    fn is_allow_if_inactive(&self) -> bool {
        self.allow_if_inactive
    }
}

/// Activates when a script returns `true`.
///
/// Bindings: `principal`, `attributes` and `service` (when known). Script
/// errors do not activate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedActivationCriteria {
    pub script: ScriptResource,

    #[serde(default = "default_true")]
    pub allow_if_inactive: bool,
}

impl ScriptedActivationCriteria {
    pub fn new(script: ScriptResource) -> Self {
        Self {
            script,
            allow_if_inactive: true,
        }
    }
}

impl ActivationCriteria for ScriptedActivationCriteria {
    fn should_activate(&self, context: &ActivationContext<'_>) -> bool {
        let mut bindings = ScriptBindings::new()
            .with("principal", context.principal_id)
            .with("attributes", context.attributes);
        if let Some(service) = context.service {
            bindings = bindings.with("service", &service.id);
        }
        self.script.evaluate_or_deny(&bindings)
    }

    fn is_allow_if_inactive(&self) -> bool {
        self.allow_if_inactive
    }
}

impl ActivationCriteria for ChainingPolicy<RegisteredServiceActivationCriteria> {
    fn should_activate(&self, context: &ActivationContext<'_>) -> bool {
        self.evaluate(|c| c.should_activate(context))
    }

    fn is_allow_if_inactive(&self) -> bool {
        self.evaluate(|c| c.is_allow_if_inactive())
    }
}
