//! Matching strategies decide whether an incoming service identifier (usually
//! a URL) belongs to a registered service definition.

mod pattern;

pub use pattern::{CompiledPattern, PatternCache, is_literal};
use serde::{Deserialize, Serialize};

use crate::registry::RegisteredService;

/// Pure predicate over a registered service's configured identifier and the
/// identifier presented at runtime.
pub trait MatchingStrategy {
    fn matches(&self, registered_service: &RegisteredService, service_id: &str) -> bool;
}

/// All supported matching strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegisteredServiceMatchingStrategy {
    /// The whole candidate must match the service id as a regular expression.
    FullRegex(FullRegexMatchingStrategy),
    /// The service id regular expression may match anywhere in the candidate.
    PartialRegex(PartialRegexMatchingStrategy),
    /// Exact comparison against the service id.
    Literal(LiteralMatchingStrategy),
    /// Case-insensitive prefix comparison against a configured URL.
    StartsWith(StartsWithMatchingStrategy),
}

impl Default for RegisteredServiceMatchingStrategy {
    fn default() -> Self {
        Self::FullRegex(FullRegexMatchingStrategy::default())
    }
}

impl MatchingStrategy for RegisteredServiceMatchingStrategy {
    fn matches(&self, registered_service: &RegisteredService, service_id: &str) -> bool {
        match self {
            Self::FullRegex(s) => s.matches(registered_service, service_id),
            Self::PartialRegex(s) => s.matches(registered_service, service_id),
            Self::Literal(s) => s.matches(registered_service, service_id),
            Self::StartsWith(s) => s.matches(registered_service, service_id),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullRegexMatchingStrategy {
    /// Regex patterns are compiled case-insensitively unless disabled.
    #[serde(default = "default_true")]
    pub case_insensitive: bool,

    #[serde(skip)]
    compiled: PatternCache,
}

impl Default for FullRegexMatchingStrategy {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            compiled: PatternCache::new(),
        }
    }
}

impl FullRegexMatchingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }
}

impl MatchingStrategy for FullRegexMatchingStrategy {
    fn matches(&self, registered_service: &RegisteredService, service_id: &str) -> bool {
        if service_id.trim().is_empty() {
            return false;
        }
        let case_insensitive = self.case_insensitive;
        self.compiled
            .get_or_compile(&registered_service.service_id, |source| {
                CompiledPattern::compile_anchored(source, case_insensitive)
            })
            .is_match(service_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRegexMatchingStrategy {
    #[serde(default = "default_true")]
    pub case_insensitive: bool,

    #[serde(skip)]
    compiled: PatternCache,
}

impl Default for PartialRegexMatchingStrategy {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            compiled: PatternCache::new(),
        }
    }
}

impl PartialRegexMatchingStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchingStrategy for PartialRegexMatchingStrategy {
    fn matches(&self, registered_service: &RegisteredService, service_id: &str) -> bool {
        if service_id.trim().is_empty() {
            return false;
        }
        let case_insensitive = self.case_insensitive;
        self.compiled
            .get_or_compile(&registered_service.service_id, |source| {
                CompiledPattern::compile(source, case_insensitive)
            })
            .is_match(service_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralMatchingStrategy {
    /// Compare ignoring case. Off by default.
    #[serde(default)]
    pub case_insensitive: bool,
}

impl LiteralMatchingStrategy {
    pub fn new(case_insensitive: bool) -> Self {
        Self { case_insensitive }
    }
}

impl MatchingStrategy for LiteralMatchingStrategy {
    fn matches(&self, registered_service: &RegisteredService, service_id: &str) -> bool {
        let expected = registered_service.service_id.trim();
        let candidate = service_id.trim();
        if self.case_insensitive {
            expected.to_lowercase() == candidate.to_lowercase()
        } else {
            expected == candidate
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartsWithMatchingStrategy {
    /// The prefix every matching candidate starts with.
    pub expected_url: String,
}

impl StartsWithMatchingStrategy {
    pub fn new(expected_url: impl Into<String>) -> Self {
        Self {
            expected_url: expected_url.into(),
        }
    }
}

impl MatchingStrategy for StartsWithMatchingStrategy {
    fn matches(&self, _registered_service: &RegisteredService, service_id: &str) -> bool {
        if self.expected_url.is_empty() {
            return false;
        }
        service_id
            .to_lowercase()
            .starts_with(&self.expected_url.to_lowercase())
    }
}
