//! `${...}` placeholder resolution for policy configuration values.
//!
//! Placeholders are resolved against, in order:
//! 1. Request-scoped variables supplied by the caller (`principal`, `service`,
//!    `attributes.<name>`, ...)
//! 2. Built-ins: `now`, `localDateTime`, `localDateTimeUtc`, `zonedDateTime`
//! 3. Environment variables, as `env.<NAME>`
//!
//! Unresolved placeholders are left verbatim so that a misconfiguration shows
//! up in logs instead of silently becoming an empty string.

use std::collections::BTreeMap;

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::attributes::Attributes;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Variables available to placeholder resolution.
#[derive(Debug, Clone, Default)]
pub struct ExpressionResolver {
    variables: BTreeMap<String, String>,
}

impl ExpressionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Expose every attribute as `attributes.<name>`; multiple values are
    /// joined with commas.
    pub fn with_attributes(mut self, attributes: &Attributes) -> Self {
        for (name, values) in attributes {
            self.variables
                .insert(format!("attributes.{name}"), values.join(","));
        }
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.variables.get(name) {
            return Some(value.clone());
        }
        match name {
            "now" | "zonedDateTime" => return Some(Utc::now().to_rfc3339()),
            "localDateTime" => {
                return Some(Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string());
            }
            "localDateTimeUtc" => {
                return Some(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string());
            }
            _ => {}
        }
        name.strip_prefix("env.")
            .and_then(|var| std::env::var(var).ok())
    }

    /// Whether `value` still holds a `${...}` placeholder.
    pub fn has_placeholder(value: &str) -> bool {
        PLACEHOLDER.is_match(value)
    }

    /// Resolve every placeholder in `input`.
    pub fn resolve(&self, input: &str) -> String {
        if !input.contains("${") {
            return input.to_string();
        }
        PLACEHOLDER
            .replace_all(input, |caps: &regex::Captures<'_>| {
                let name = caps[1].trim();
                match self.lookup(name) {
                    Some(value) => value,
                    None => {
                        tracing::debug!(placeholder = %name, "Unresolved placeholder left as-is");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}
