use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, compiling or running a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script compilation failed: {0}")]
    Compile(String),

    #[error("Script execution failed: {0}")]
    Execution(String),

    #[error("Script must evaluate to a boolean, got {0}")]
    NotBoolean(String),

    #[error("Scripting support is not enabled (build with the 'cel' feature)")]
    Unsupported,
}
