//! Configuration for the diagnostic tooling and embedding applications.
//!
//! Registered services are configured via a TOML file, with support for
//! environment variable interpolation using `${VAR_NAME}` syntax. Only
//! upper-case names are interpolated at load time; lower-case and dotted
//! placeholders such as `${principal}` or `${env.HOME}` are left for
//! per-request resolution by the policies themselves.
//!
//! # Example
//!
//! ```toml
//! [observability.logging]
//! level = "debug"
//!
//! [[services]]
//! id = 1
//! service_id = "https://app\\.example\\.org/.*"
//! name = "App"
//!
//! [services.access_strategy]
//! type = "opa"
//! api_url = "${OPA_URL}"
//! decision = "cas/allow"
//! ```

mod observability;

use std::{collections::HashSet, path::Path};

use once_cell::sync::Lazy;
pub use observability::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::registry::{InMemoryServiceRegistry, RegisteredService};

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid"));

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortcullisConfig {
    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Registered service definitions.
    #[serde(default)]
    pub services: Vec<RegisteredService>,
}

impl PortcullisConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        // Feature-gated policy types are reported before typed parsing
        let raw: toml::Value = toml::from_str(&expanded)?;
        check_disabled_features(&raw)?;

        let config: PortcullisConfig = toml::from_str(&expanded)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for service in &self.services {
            if service.service_id.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "service '{}' (id {}) has an empty service_id",
                    service.name, service.id
                )));
            }
            if !ids.insert(service.id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate registered service id {} ('{}')",
                    service.id, service.name
                )));
            }
        }
        Ok(())
    }

    /// A registry holding every configured service.
    pub fn service_registry(&self) -> InMemoryServiceRegistry {
        InMemoryServiceRegistry::new(self.services.iter().cloned())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Scripted policies need the `cel` feature. Without this check, a build
/// lacking it would silently deny through the script stub.
fn check_disabled_features(raw: &toml::Value) -> Result<(), ConfigError> {
    let mut issues: Vec<String> = Vec::new();
    if let Some(services) = raw.get("services").and_then(|v| v.as_array()) {
        for (index, service) in services.iter().enumerate() {
            collect_scripted(service, &format!("services[{index}]"), &mut issues);
        }
    }

    if issues.is_empty() || cfg!(feature = "cel") {
        return Ok(());
    }

    let details = issues.join("\n  - ");
    Err(ConfigError::Validation(format!(
        "Configuration requires features not compiled in this build:\n  \
         - {details}\n\n\
         Rebuild with: cargo build --features cel"
    )))
}

fn collect_scripted(value: &toml::Value, path: &str, issues: &mut Vec<String>) {
    match value {
        toml::Value::Table(table) => {
            if table.get("type").and_then(|v| v.as_str()) == Some("scripted") {
                issues.push(format!("{path} uses type 'scripted' which requires the 'cel' feature"));
            }
            for (key, child) in table {
                collect_scripted(child, &format!("{path}.{key}"), issues);
            }
        }
        toml::Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_scripted(child, &format!("{path}[{index}]"), issues);
            }
        }
        _ => {}
    }
}

/// Byte offset of a `#` that starts a comment, ignoring any inside quoted
/// strings.
fn comment_start(line: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (pos, c) in line.char_indices() {
        match quote {
            // Literal strings have no escapes
            Some('"') if escaped => escaped = false,
            Some('"') if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => return Some(pos),
            None => {}
        }
    }
    None
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips anything after a comment `#` on the line.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = comment_start(line);

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::{
        access::{AccessStrategy, RegisteredServiceAccessStrategy},
        registry::ServiceRegistry,
    };

    const SERVICES: &str = r#"
        [observability.logging]
        level = "debug"
        format = "json"

        [[services]]
        id = 1
        service_id = "https://app\\.example\\.org/.*"
        name = "App"
        evaluation_order = 10

        [services.access_strategy]
        type = "default"
        sso_enabled = false

        [services.access_strategy.required_attributes]
        memberOf = ["admins"]

        [[services]]
        id = 2
        service_id = "https://fga.example.org"
        name = "Fga"

        [services.matching_strategy]
        type = "literal"

        [services.access_strategy]
        type = "openfga"
        api_url = "http://localhost:8080"
        store_id = "01H"
        user = "user:${principal}"
    "#;

    #[test]
    fn test_services_config() {
        let config = PortcullisConfig::from_str(SERVICES).unwrap();
        assert_eq!(config.observability.logging.level, LogLevel::Debug);
        assert_eq!(config.observability.logging.format, LogFormat::Json);
        assert_eq!(config.services.len(), 2);

        let app = &config.services[0];
        assert!(!app.access_strategy.is_service_access_allowed_for_sso());
        assert_eq!(app.access_strategy.required_attributes()["memberOf"].len(), 1);

        // Lower-case placeholders survive loading
        match &config.services[1].access_strategy {
            RegisteredServiceAccessStrategy::OpenFga(s) => assert_eq!(s.user, "user:${principal}"),
            other => panic!("unexpected strategy {other:?}"),
        }

        let registry = config.service_registry();
        assert_eq!(registry.find_service("https://fga.example.org").unwrap().id, 2);
        assert_eq!(registry.find_service("https://app.example.org/x").unwrap().id, 1);
    }

    #[test]
    fn test_empty_config() {
        let config = PortcullisConfig::from_str("").unwrap();
        assert!(config.services.is_empty());
        assert_eq!(config.observability.logging, LoggingConfig::default());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = PortcullisConfig::from_str(
            r#"
            [[services]]
            id = 1
            service_id = "a"
            name = "A"

            [[services]]
            id = 1
            service_id = "b"
            name = "B"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_empty_service_id_rejected() {
        let err = PortcullisConfig::from_str(
            r#"
            [[services]]
            id = 1
            service_id = "  "
            name = "A"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("empty service_id")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = PortcullisConfig::from_str("[server]\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SERVICES.as_bytes()).unwrap();
        let config = PortcullisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.services.len(), 2);

        let missing = PortcullisConfig::from_file("/nonexistent/portcullis.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io(..)));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("PORTCULLIS_TEST_OPA", Some("http://opa:8181"), || {
            let result = expand_env_vars("api_url = \"${PORTCULLIS_TEST_OPA}\"").unwrap();
            assert_eq!(result, "api_url = \"http://opa:8181\"");
        });
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("PORTCULLIS_TEST_MISSING", || {
            let err = expand_env_vars("url = \"${PORTCULLIS_TEST_MISSING}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "PORTCULLIS_TEST_MISSING"));
        });
    }

    #[test]
    fn test_policy_placeholders_not_expanded() {
        let input = r#"user = "user:${principal}" entity = "${registeredService.id}" home = "${env.HOME}""#;
        assert_eq!(expand_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("key = \"value\" # ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "key = \"value\" # ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_multiline_with_comments() {
        temp_env::with_var("PORTCULLIS_TEST_MULTI", Some("value1"), || {
            let input = r#"key1 = "${PORTCULLIS_TEST_MULTI}"
# key2 = "${NONEXISTENT}"
key3 = "literal""#;
            let result = expand_env_vars(input).unwrap();
            assert_eq!(
                result,
                r#"key1 = "value1"
# key2 = "${NONEXISTENT}"
key3 = "literal""#
            );
        });
    }

    #[test]
    fn test_hash_inside_quotes_is_not_a_comment() {
        temp_env::with_var("PORTCULLIS_TEST_APP", Some("portal"), || {
            let result = expand_env_vars(
                r#"service_id = "https://app/#/${PORTCULLIS_TEST_APP}" # ${NONEXISTENT}"#,
            )
            .unwrap();
            assert_eq!(result, r#"service_id = "https://app/#/portal" # ${NONEXISTENT}"#);

            let result =
                expand_env_vars(r#"name = 'a#b' # "${NONEXISTENT}""#).unwrap();
            assert_eq!(result, r#"name = 'a#b' # "${NONEXISTENT}""#);

            let result =
                expand_env_vars(r##"name = "say \"#\" ${PORTCULLIS_TEST_APP}""##).unwrap();
            assert_eq!(result, r##"name = "say \"#\" portal""##);
        });
        assert_eq!(comment_start(r##"a = "#" # c"##), Some(8));
        assert_eq!(comment_start("# only"), Some(0));
        assert_eq!(comment_start(r#"a = "x#y""#), None);
    }

    #[test]
    fn test_scripted_policy_detection() {
        let raw: toml::Value = toml::from_str(
            r#"
            [[services]]
            id = 1
            service_id = "a"
            name = "A"

            [services.access_strategy]
            type = "chaining"
            operator = "and"

            [[services.access_strategy.policies]]
            type = "scripted"
            script = "principal == 'casuser'"
        "#,
        )
        .unwrap();
        let mut issues = Vec::new();
        collect_scripted(&raw["services"][0], "services[0]", &mut issues);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("services[0].access_strategy.policies[0]"));
        assert_eq!(check_disabled_features(&raw).is_ok(), cfg!(feature = "cel"));
    }
}
