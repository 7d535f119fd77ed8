//! Scripted evaluation for strategies, activation criteria and SSO policies.
//!
//! A script resource is either an inline CEL expression or a `file:` reference
//! to one. The source is loaded and compiled on first use and cached; every
//! evaluation binds a fresh set of variables. Scripts must evaluate to a
//! boolean.
//!
//! # Example
//!
//! ```toml
//! [services.access_strategy]
//! type = "scripted"
//! script = "method != 'authorizeRequest' || 'admin' in attributes.memberOf"
//! ```

mod error;

use std::{collections::BTreeMap, path::PathBuf};
#[cfg(feature = "cel")]
use std::{panic, sync::Arc};

#[cfg(feature = "cel")]
use cel_interpreter::{Context, Program, Value, to_value};
pub use error::ScriptError;
#[cfg(feature = "cel")]
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Prefix marking a script stored in an external file.
pub const FILE_PREFIX: &str = "file:";

/// Variables bound into a script evaluation.
#[derive(Debug, Clone, Default)]
pub struct ScriptBindings {
    variables: BTreeMap<String, serde_json::Value>,
}

impl ScriptBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.variables.insert(name.into(), value);
        self
    }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.variables.iter()
    }
}

/// An inline or file-backed script with a compile-once cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ScriptResource {
    source: String,
    #[cfg(feature = "cel")]
    program: OnceCell<Arc<Program>>,
}

impl From<String> for ScriptResource {
    fn from(source: String) -> Self {
        Self {
            source,
            #[cfg(feature = "cel")]
            program: OnceCell::new(),
        }
    }
}

impl From<ScriptResource> for String {
    fn from(resource: ScriptResource) -> Self {
        resource.source
    }
}

impl PartialEq for ScriptResource {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl ScriptResource {
    /// An inline expression.
    pub fn inline(expression: impl Into<String>) -> Self {
        Self::from(expression.into())
    }

    /// A script read from `path` on first use.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::from(format!("{FILE_PREFIX}{}", path.into().display()))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The referenced file, for file-backed scripts.
    pub fn path(&self) -> Option<PathBuf> {
        self.source
            .strip_prefix(FILE_PREFIX)
            .map(|p| PathBuf::from(p.trim()))
    }

    #[cfg(feature = "cel")]
    fn load_source(&self) -> Result<String, ScriptError> {
        match self.path() {
            Some(path) => std::fs::read_to_string(&path).map_err(|e| ScriptError::Load { path, source: e }),
            None => Ok(self.source.clone()),
        }
    }

    /// Evaluate the script with `bindings`, requiring a boolean result.
    #[cfg(feature = "cel")]
    pub fn evaluate(&self, bindings: &ScriptBindings) -> Result<bool, ScriptError> {
        let program = self.program()?;

        let mut ctx = Context::default();
        for (name, value) in bindings.variables() {
            let value = to_value(value).map_err(|e| {
                ScriptError::Execution(format!("Failed to bind variable '{}': {}", name, e))
            })?;
            ctx.add_variable(name.as_str(), value);
        }

        // The interpreter's generated parser/executor can panic on edge cases
        let exec_result = panic::catch_unwind(panic::AssertUnwindSafe(|| program.execute(&ctx)));

        match exec_result {
            Ok(Ok(Value::Bool(b))) => Ok(b),
            Ok(Ok(other)) => Err(ScriptError::NotBoolean(format!("{:?}", other))),
            Ok(Err(e)) => Err(ScriptError::Execution(e.to_string())),
            Err(_) => Err(ScriptError::Execution(
                "script execution failed (internal error)".to_string(),
            )),
        }
    }

    /// Evaluate the script (stub: scripting is not compiled in).
    #[cfg(not(feature = "cel"))]
    pub fn evaluate(&self, _bindings: &ScriptBindings) -> Result<bool, ScriptError> {
        Err(ScriptError::Unsupported)
    }

    /// Evaluate, mapping any failure to `false` after logging it.
    pub fn evaluate_or_deny(&self, bindings: &ScriptBindings) -> bool {
        match self.evaluate(bindings) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(script = %self.describe(), error = %e, "Script evaluation failed");
                false
            }
        }
    }

    #[cfg(feature = "cel")]
    fn program(&self) -> Result<Arc<Program>, ScriptError> {
        if let Some(program) = self.program.get() {
            return Ok(program.clone());
        }
        let source = self.load_source()?;
        let compiled = panic::catch_unwind(panic::AssertUnwindSafe(|| Program::compile(&source)));
        let program = match compiled {
            Ok(Ok(program)) => Arc::new(program),
            Ok(Err(e)) => return Err(ScriptError::Compile(e.to_string())),
            Err(_) => {
                return Err(ScriptError::Compile(
                    "script parsing failed (malformed syntax)".to_string(),
                ));
            }
        };
        // A concurrent initializer may win; both compiled the same source.
        Ok(self.program.get_or_init(|| program).clone())
    }

    /// Short description for logs: file path, or the first line of inline source.
    fn describe(&self) -> String {
        match self.path() {
            Some(path) => path.display().to_string(),
            None => self.source.lines().next().unwrap_or_default().to_string(),
        }
    }
}
