// src/exec/resolve.rs

//! Turns static configuration plus a trigger event into an
//! [`ExecutionRequest`].
//!
//! Resolution is pure: nothing here touches the process environment or the
//! filesystem, so every rule can be tested with plain JSON values.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::errors::{ExecError, Result};
use crate::message::{self, PropertyPath};
use crate::types::InputMode;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\s*([^}]*?)\s*\}").expect("Invalid regex pattern"));

/// Everything needed to spawn one process. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables merged over the ambient environment.
    pub env: BTreeMap<String, String>,
    pub input: InputMode,
    /// Bytes written to stdin (only for [`InputMode::Pipe`]).
    pub stdin: Option<Vec<u8>>,
}

impl ExecutionRequest {
    /// Human-readable command line used in logs and the control result.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build the request for `event` (after pre-processing).
pub fn resolve(cfg: &NodeConfig, event: &Value) -> Result<ExecutionRequest> {
    let command = cfg.command.trim();
    if command.is_empty() {
        return Err(ExecError::NoCommand);
    }

    let cwd = match &cfg.cwd {
        Some(expr) => Some(expand_cwd(expr, event)?),
        None => None,
    };

    let env = match &cfg.env_source {
        Some(path) => env_overlay(path, event),
        None => BTreeMap::new(),
    };

    let args = resolve_args(&cfg.arguments_source, &cfg.args, event);

    let stdin = match cfg.input {
        InputMode::Pipe => event.get("payload").and_then(stdin_bytes),
        InputMode::None | InputMode::Argument => None,
    };

    Ok(ExecutionRequest {
        command: command.to_string(),
        args,
        cwd,
        env,
        input: cfg.input,
        stdin,
    })
}

/// Argument precedence: string field (split on whitespace), array field
/// (one argument per element), any other present value (one argument),
/// otherwise the static default string.
pub fn resolve_args(source: &PropertyPath, default_args: &str, event: &Value) -> Vec<String> {
    match source.get(event) {
        Some(Value::String(s)) => split_args(s),
        Some(Value::Array(items)) => items.iter().map(message::stringify).collect(),
        Some(Value::Null) | None => split_args(default_args),
        Some(other) => vec![message::stringify(other)],
    }
}

/// Split on whitespace, dropping empty tokens.
pub fn split_args(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

/// Expand `${path}` placeholders in a working-directory expression.
pub fn expand_cwd(expr: &str, event: &Value) -> Result<PathBuf> {
    let fail = |reason: String| ExecError::WorkingDirectory {
        expression: expr.to_string(),
        reason,
    };

    let mut out = String::with_capacity(expr.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(expr) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&expr[last..whole.start()]);

        let path: PropertyPath = inner.as_str().parse().map_err(fail)?;
        match path.get(event) {
            Some(Value::Null) | None => {
                return Err(fail(format!("field '{path}' is not set")));
            }
            Some(value) => out.push_str(&message::stringify(value)),
        }
        last = whole.end();
    }
    out.push_str(&expr[last..]);

    if out.contains("${") {
        return Err(fail("unterminated placeholder".to_string()));
    }
    if out.trim().is_empty() {
        return Err(fail("expression evaluated to an empty path".to_string()));
    }
    Ok(PathBuf::from(out))
}

/// Read the environment overlay map. Failures only skip the overlay.
fn env_overlay(path: &PropertyPath, event: &Value) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    match path.get(event) {
        Some(Value::Object(map)) => {
            for (key, value) in map {
                if key.is_empty() || key.contains('=') || key.contains('\0') {
                    warn!(key = %key, "skipping invalid environment variable name");
                    continue;
                }
                debug!(key = %key, value = "<redacted>", "injecting environment variable");
                env.insert(key.clone(), message::stringify(value));
            }
        }
        Some(Value::Null) | None => {
            debug!(field = %path, "environment source not present; no overlay");
        }
        Some(other) => {
            warn!(
                field = %path,
                found = message::type_name(other),
                "environment source is not an object; overlay skipped"
            );
        }
    }
    env
}

/// Bytes fed to stdin for `input = "pipe"`.
///
/// `{"type": "Buffer", "data": [..]}` is written verbatim as bytes, strings
/// as UTF-8, anything else as JSON text.
pub fn stdin_bytes(payload: &Value) -> Option<Vec<u8>> {
    match payload {
        Value::Null => None,
        Value::String(s) => Some(s.as_bytes().to_vec()),
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("Buffer") => {
            let data = map.get("data").and_then(Value::as_array)?;
            data.iter()
                .map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()
                .or_else(|| Some(payload.to_string().into_bytes()))
        }
        other => Some(other.to_string().into_bytes()),
    }
}
