use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{SsoParticipationPolicy, SsoPolicySettings, TriStateBoolean};
use crate::{
    expression::ExpressionResolver, matching::CompiledPattern, registry::RegisteredService,
    ticket::TicketState,
};

fn default_true() -> bool {
    true
}

/// Participates when the session's principal or authentication attributes
/// match the configured patterns.
///
/// Patterns may contain `${...}` placeholders, resolved on every evaluation
/// against `principal`, `service` and `attributes.<name>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSsoParticipationPolicy {
    #[serde(flatten)]
    pub settings: SsoPolicySettings,

    /// Attribute name to acceptable value patterns.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,

    #[serde(default = "default_true")]
    pub require_all_attributes: bool,
}

impl AttributeSsoParticipationPolicy {
    pub fn new(require_all_attributes: bool) -> Self {
        Self {
            settings: SsoPolicySettings::default(),
            attributes: BTreeMap::new(),
            require_all_attributes,
        }
    }

    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .entry(name.into())
            .or_default()
            .extend(patterns.into_iter().map(Into::into));
        self
    }
}

impl SsoParticipationPolicy for AttributeSsoParticipationPolicy {
    fn should_participate_in_sso(
        &self,
        registered_service: &RegisteredService,
        ticket: &dyn TicketState,
    ) -> bool {
        if self.attributes.is_empty() {
            return true;
        }

        let authentication = ticket.authentication();
        let available = authentication.merged_attributes();
        let resolver = ExpressionResolver::new()
            .with_variable("principal", authentication.principal.id.as_str())
            .with_variable("service", registered_service.service_id.as_str())
            .with_attributes(&available);

        let mut results = self.attributes.iter().map(|(name, patterns)| {
            let Some(values) = available.get(name) else {
                return false;
            };
            let resolved: Vec<String> = patterns.iter().map(|p| resolver.resolve(p)).collect();
            let pattern = CompiledPattern::concatenate(resolved.iter().map(String::as_str), false);
            values.iter().any(|v| pattern.is_match(v))
        });
        let participate = if self.require_all_attributes {
            results.all(|matched| matched)
        } else {
            results.any(|matched| matched)
        };

        if !participate {
            tracing::debug!(
                service = %registered_service.name,
                principal = %authentication.principal.id,
                require_all = self.require_all_attributes,
                "Session attributes do not satisfy the SSO participation policy"
            );
        }
        participate
    }

    fn create_cookie_on_renewed_authentication(&self) -> TriStateBoolean {
        self.settings.create_cookie_on_renewed_authentication
    }

    fn order(&self) -> i32 {
        self.settings.order
    }
}
