// src/errors.rs

//! Crate-wide error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::script::ScriptError;

/// Which user script a script failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStage {
    Pre,
    Post,
}

impl fmt::Display for ScriptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptStage::Pre => f.write_str("pre-processing"),
            ScriptStage::Post => f.write_str("post-processing"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration error: no command specified")]
    NoCommand,

    #[error("Configuration error: cannot evaluate working directory '{expression}': {reason}")]
    WorkingDirectory { expression: String, reason: String },

    #[error("{stage} script timed out after {}ms", timeout.as_millis())]
    ScriptTimeout { stage: ScriptStage, timeout: Duration },

    #[error("{stage} script error: {message}")]
    ScriptRuntime { stage: ScriptStage, message: String },

    #[error("{stage} script requested capability '{capability}', which is not allowed")]
    CapabilityDenied {
        stage: ScriptStage,
        capability: String,
    },

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed writing to process stdin: {0}")]
    StreamWrite(#[source] std::io::Error),

    #[error("output lane closed: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecError {
    /// Attach the stage to a failure raised by the script interpreter.
    ///
    /// Syntax errors only surface here for scripts compiled outside config
    /// validation, so they are reported like any other runtime fault.
    pub fn from_script(stage: ScriptStage, err: ScriptError) -> Self {
        match err {
            ScriptError::Timeout(timeout) => ExecError::ScriptTimeout { stage, timeout },
            ScriptError::CapabilityDenied(capability) => {
                ExecError::CapabilityDenied { stage, capability }
            }
            ScriptError::Syntax { .. } | ScriptError::Runtime(_) => ExecError::ScriptRuntime {
                stage,
                message: err.to_string(),
            },
        }
    }

    /// Short human-readable reason shown in the status indicator.
    pub fn status_text(&self) -> &'static str {
        match self {
            ExecError::NoCommand => "no command",
            ExecError::WorkingDirectory { .. } => "invalid cwd",
            ExecError::Configuration(_) => "config error",
            ExecError::ScriptTimeout { stage, .. }
            | ExecError::ScriptRuntime { stage, .. }
            | ExecError::CapabilityDenied { stage, .. } => match stage {
                ScriptStage::Pre => "pre-script error",
                ScriptStage::Post => "post-script error",
            },
            ExecError::Spawn { .. } => "spawn error",
            ExecError::StreamWrite(_) => "stdin error",
            _ => "setup error",
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ExecError>;
