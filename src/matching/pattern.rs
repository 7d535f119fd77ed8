//! Regular-expression helpers shared by matching strategies and attribute rules.

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};

/// A compiled pattern, or a sentinel that never matches.
///
/// Invalid configuration compiles to [`CompiledPattern::MatchNothing`] so
/// that evaluation degrades to "no match" instead of failing at runtime.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Regex(Regex),
    MatchNothing,
}

impl CompiledPattern {
    /// Compile `pattern` as an unanchored regular expression.
    pub fn compile(pattern: &str, case_insensitive: bool) -> Self {
        Self::build(pattern, pattern, case_insensitive)
    }

    /// Compile `pattern` so that it only matches an entire input.
    pub fn compile_anchored(pattern: &str, case_insensitive: bool) -> Self {
        Self::build(&format!("^(?:{pattern})$"), pattern, case_insensitive)
    }

    /// Compile an alternation of `values`.
    pub fn concatenate<'a, I>(values: I, case_insensitive: bool) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let alternatives: Vec<&str> = values.into_iter().collect();
        if alternatives.is_empty() {
            return Self::MatchNothing;
        }
        let source = format!("(?:{})", alternatives.join("|"));
        Self::build(&source, &source, case_insensitive)
    }

    fn build(source: &str, original: &str, case_insensitive: bool) -> Self {
        match RegexBuilder::new(source)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(regex) => Self::Regex(regex),
            Err(e) => {
                tracing::warn!(
                    pattern = %original,
                    error = %e,
                    "Invalid regular expression; substituting a pattern that matches nothing"
                );
                Self::MatchNothing
            }
        }
    }

    /// Whether the pattern occurs anywhere in `value`.
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(value),
            Self::MatchNothing => false,
        }
    }

    pub fn is_match_nothing(&self) -> bool {
        matches!(self, Self::MatchNothing)
    }
}

/// Whether `value` contains no regular-expression metacharacters.
pub fn is_literal(value: &str) -> bool {
    const META: &str = r"\.+*?()|[]{}^$";
    !value.chars().any(|c| META.contains(c))
}

/// Compile-once cache for a pattern derived from configuration.
///
/// The cache remembers the source it was computed from; asking for a
/// different source compiles without caching. Racing initializers compute the
/// same value, so no lock is held across compilation.
#[derive(Debug, Clone, Default)]
pub struct PatternCache {
    cell: OnceCell<(String, CompiledPattern)>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile<F>(&self, source: &str, compile: F) -> CompiledPattern
    where
        F: Fn(&str) -> CompiledPattern,
    {
        let (cached_source, pattern) = self
            .cell
            .get_or_init(|| (source.to_string(), compile(source)));
        if cached_source == source {
            pattern.clone()
        } else {
            compile(source)
        }
    }
}

// Derived state never takes part in equality of the owning configuration.
impl PartialEq for PatternCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}
