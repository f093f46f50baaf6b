// src/config/model.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::message::PropertyPath;
use crate::script::Script;
use crate::types::InputMode;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// name = "greeter"
/// command = "echo"
/// args = "hello"
/// arguments_source = "payload"
/// env_source = "env"
/// cwd = "/srv/${payload.dir}"
/// input = "argument"
/// result_field = "payload"
/// send_start_control = false
///
/// [thresholds]
/// error = 1
/// warning = 2
///
/// [scripts]
/// pre = "msg.payload = msg.payload.trim();"
/// post = "msg.payload.lines = msg.payload.stdout.split(\"\\n\");"
/// timeout_ms = 1000
///
/// [shutdown]
/// grace_ms = 2000
/// ```
///
/// Every field is optional. A missing `command` is accepted here and
/// reported per invocation instead.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RawNodeConfig {
    /// Display name used in logs and exposed to scripts as `node.name`.
    #[serde(default)]
    pub name: String,

    /// Program to execute (looked up on `PATH` when not absolute).
    #[serde(default)]
    pub command: String,

    /// Static argument string, split on whitespace. Used only when the
    /// `arguments_source` field of the event is absent.
    #[serde(default)]
    pub args: String,

    /// Event field the arguments are read from.
    #[serde(default = "default_arguments_source")]
    pub arguments_source: String,

    /// Event field holding a map of extra environment variables.
    #[serde(default)]
    pub env_source: Option<String>,

    /// Working-directory expression with optional `${path}` placeholders.
    #[serde(default)]
    pub cwd: Option<String>,

    #[serde(default)]
    pub input: InputMode,

    /// Field of every emitted message that receives the result.
    #[serde(default = "default_result_field")]
    pub result_field: String,

    /// Emit `{state: "start", pid}` on the control lane right after spawn.
    #[serde(default)]
    pub send_start_control: bool,

    #[serde(default)]
    pub thresholds: ThresholdSection,

    #[serde(default)]
    pub scripts: ScriptSection,

    #[serde(default)]
    pub shutdown: ShutdownSection,
}

fn default_arguments_source() -> String {
    "payload".to_string()
}

fn default_result_field() -> String {
    "payload".to_string()
}

/// `[thresholds]` section: exit-code classification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdSection {
    /// Exit codes at or above this value are errors.
    #[serde(default = "default_error_threshold")]
    pub error: i32,

    /// Exit codes in `warning..error` are warnings. Disabled when absent.
    #[serde(default)]
    pub warning: Option<i32>,
}

fn default_error_threshold() -> i32 {
    1
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            error: default_error_threshold(),
            warning: None,
        }
    }
}

/// `[scripts]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptSection {
    #[serde(default)]
    pub pre: Option<String>,

    #[serde(default)]
    pub post: Option<String>,

    /// Wall-clock limit for a single script execution.
    #[serde(default = "default_script_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_script_timeout_ms() -> u64 {
    1000
}

impl Default for ScriptSection {
    fn default() -> Self {
        Self {
            pre: None,
            post: None,
            timeout_ms: default_script_timeout_ms(),
        }
    }
}

/// `[shutdown]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShutdownSection {
    /// Delay between the graceful and the forced termination signal.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

fn default_grace_ms() -> u64 {
    2000
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
        }
    }
}

/// Exit-code thresholds after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub error: i32,
    pub warning: Option<i32>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            error: default_error_threshold(),
            warning: None,
        }
    }
}

/// Validated configuration consumed by the engine.
///
/// Property paths are parsed and scripts compiled, so nothing here can fail
/// to interpret at invocation time except event-dependent lookups.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub command: String,
    pub args: String,
    pub arguments_source: PropertyPath,
    pub env_source: Option<PropertyPath>,
    pub cwd: Option<String>,
    pub input: InputMode,
    pub result_field: PropertyPath,
    pub send_start_control: bool,
    pub thresholds: Thresholds,
    pub pre_script: Option<Script>,
    pub post_script: Option<Script>,
    pub script_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl NodeConfig {
    /// Read-only view handed to scripts as `config`.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "command": self.command,
            "args": self.args,
            "arguments_source": self.arguments_source.to_string(),
            "env_source": self.env_source.as_ref().map(|p| p.to_string()),
            "cwd": self.cwd,
            "input": self.input,
            "result_field": self.result_field.to_string(),
            "send_start_control": self.send_start_control,
            "thresholds": {
                "error": self.thresholds.error,
                "warning": self.thresholds.warning,
            },
            "script_timeout_ms": self.script_timeout.as_millis() as u64,
            "shutdown_grace_ms": self.shutdown_grace.as_millis() as u64,
        })
    }
}
