//! Principal attributes and the attribute rules evaluated against them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::matching::{CompiledPattern, is_literal};

/// Multi-valued attributes attached to a principal or an authentication.
pub type Attributes = HashMap<String, Vec<String>>;

/// Build an [`Attributes`] map from `(name, values)` pairs.
pub fn attributes<I, K, V>(entries: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: IntoIterator,
    V::Item: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
        .collect()
}

/// Merge `other` into `base`, accumulating values for duplicate names.
pub fn merge_multi_valued(
    base: &mut BTreeMap<String, BTreeSet<String>>,
    other: &BTreeMap<String, BTreeSet<String>>,
) {
    for (name, values) in other {
        base.entry(name.clone())
            .or_default()
            .extend(values.iter().cloned());
    }
}

/// How the acceptable values for one attribute are interpreted.
#[derive(Debug, Clone)]
enum ValueMatcher {
    /// Every acceptable value is a plain literal.
    Literal(BTreeSet<String>),
    /// At least one acceptable value is a regular expression; the values are
    /// combined into a single alternation.
    Pattern(CompiledPattern),
}

/// Attribute name to acceptable values (literals or regular expressions).
///
/// Compiled matchers are derived lazily on first use and cached. The cache is
/// not serialized and does not take part in equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, BTreeSet<String>>", into = "BTreeMap<String, BTreeSet<String>>")]
pub struct AttributeRules {
    rules: BTreeMap<String, BTreeSet<String>>,
    compiled: OnceCell<CompiledRules>,
}

#[derive(Debug, Clone)]
struct CompiledRules {
    case_insensitive: bool,
    matchers: BTreeMap<String, ValueMatcher>,
}

impl PartialEq for AttributeRules {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl From<BTreeMap<String, BTreeSet<String>>> for AttributeRules {
    fn from(rules: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self {
            rules,
            compiled: OnceCell::new(),
        }
    }
}

impl From<AttributeRules> for BTreeMap<String, BTreeSet<String>> {
    fn from(rules: AttributeRules) -> Self {
        rules.rules
    }
}

impl AttributeRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add acceptable values for `name`.
    pub fn with_rule<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.rules
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self.compiled = OnceCell::new();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn as_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.rules
    }

    fn compiled(&self, case_insensitive: bool) -> CompiledRules {
        let cached = self
            .compiled
            .get_or_init(|| self.compile(case_insensitive));
        if cached.case_insensitive == case_insensitive {
            cached.clone()
        } else {
            self.compile(case_insensitive)
        }
    }

    fn compile(&self, case_insensitive: bool) -> CompiledRules {
        let matchers = self
            .rules
            .iter()
            .map(|(name, values)| {
                let matcher = if values.iter().all(|v| is_literal(v)) {
                    ValueMatcher::Literal(values.clone())
                } else {
                    match CompiledPattern::concatenate(
                        values.iter().map(String::as_str),
                        case_insensitive,
                    ) {
                        CompiledPattern::MatchNothing => ValueMatcher::Literal(values.clone()),
                        pattern => ValueMatcher::Pattern(pattern),
                    }
                };
                (name.clone(), matcher)
            })
            .collect();
        CompiledRules {
            case_insensitive,
            matchers,
        }
    }

    /// Whether the rule for `name` accepts any of `values`.
    fn key_matches(
        compiled: &CompiledRules,
        name: &str,
        values: &[String],
    ) -> bool {
        let Some(matcher) = compiled.matchers.get(name) else {
            return false;
        };
        match matcher {
            ValueMatcher::Pattern(pattern) => values.iter().any(|v| pattern.is_match(v)),
            ValueMatcher::Literal(accepted) => values.iter().any(|v| {
                if compiled.case_insensitive {
                    accepted.iter().any(|a| a.to_lowercase() == v.to_lowercase())
                } else {
                    accepted.contains(v)
                }
            }),
        }
    }

    /// Whether any rule matches a value the principal carries.
    pub fn any_match(&self, attributes: &Attributes, case_insensitive: bool) -> bool {
        let compiled = self.compiled(case_insensitive);
        self.rules.keys().any(|name| {
            attributes
                .get(name)
                .is_some_and(|values| Self::key_matches(&compiled, name, values))
        })
    }

    /// Evaluate the rules against `attributes`.
    ///
    /// With `require_all`, every configured attribute must be present and
    /// matched; otherwise one matched attribute suffices. An empty rule set
    /// is satisfied under `require_all` and unsatisfied otherwise.
    pub fn satisfied_by(
        &self,
        attributes: &Attributes,
        require_all: bool,
        case_insensitive: bool,
    ) -> bool {
        let compiled = self.compiled(case_insensitive);
        let mut results = self.rules.keys().map(|name| {
            attributes
                .get(name)
                .is_some_and(|values| Self::key_matches(&compiled, name, values))
        });
        if require_all {
            results.all(|matched| matched)
        } else {
            results.any(|matched| matched)
        }
    }
}
