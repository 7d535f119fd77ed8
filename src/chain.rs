//! Composite ("chaining") policies.
//!
//! Access strategies, activation criteria, SSO participation policies and
//! delegated-authentication policies can all be nested inside a chain of the
//! same family. The chain is one generic container; each family implements its
//! own trait for `ChainingPolicy<Family>` by folding the chain's operator over
//! the children's answers.

use serde::{Deserialize, Serialize};

/// Logical operator used to combine child results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    /// Every child must agree.
    #[default]
    And,
    /// At least one child must agree.
    Or,
}

impl LogicalOperator {
    /// Fold the operator over a sequence of results.
    ///
    /// Short-circuits like `Iterator::all`/`Iterator::any`. An empty sequence
    /// yields `true` for `And` and `false` for `Or`.
    pub fn fold<I>(self, results: I) -> bool
    where
        I: IntoIterator<Item = bool>,
    {
        let mut results = results.into_iter();
        match self {
            Self::And => results.all(|r| r),
            Self::Or => results.any(|r| r),
        }
    }

    /// Whether `result` decides the fold on its own, so the remaining
    /// children need not be evaluated.
    pub fn is_decisive(self, result: bool) -> bool {
        match self {
            Self::And => !result,
            Self::Or => result,
        }
    }
}

impl std::fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// An ordered list of child policies combined with a logical operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainingPolicy<T> {
    /// Child policies, evaluated in order.
    #[serde(default = "Vec::new")]
    pub policies: Vec<T>,

    /// How child results are combined.
    #[serde(default)]
    pub operator: LogicalOperator,
}

impl<T> Default for ChainingPolicy<T> {
    fn default() -> Self {
        Self {
            policies: Vec::new(),
            operator: LogicalOperator::default(),
        }
    }
}

impl<T> ChainingPolicy<T> {
    pub fn new(operator: LogicalOperator) -> Self {
        Self {
            policies: Vec::new(),
            operator,
        }
    }

    pub fn with_policy(mut self, policy: T) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn with_policies(mut self, policies: impl IntoIterator<Item = T>) -> Self {
        self.policies.extend(policies);
        self
    }

    pub fn add_policy(&mut self, policy: T) {
        self.policies.push(policy);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Evaluate `predicate` against the children and fold the results.
    pub fn evaluate<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.operator.fold(self.policies.iter().map(predicate))
    }
}
