// src/script/runner.rs

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::interp::{self, Bindings};
use super::{Sandbox, Script, ScriptError};

/// Executes compiled scripts off the async executor.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    sandbox: Sandbox,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(sandbox: Sandbox, timeout: Duration) -> Self {
        Self { sandbox, timeout }
    }

    /// Run `script` against `bindings` and return the resulting `msg`
    /// (`Value::Null` when the script dropped it).
    pub async fn run(&self, script: &Script, bindings: Bindings) -> Result<Value, ScriptError> {
        let script = script.clone();
        let sandbox = self.sandbox.clone();
        let timeout = self.timeout;

        debug!(node = %sandbox.node_name(), ?timeout, "running script");

        tokio::task::spawn_blocking(move || {
            interp::execute(script.program(), &sandbox, bindings, timeout)
        })
        .await
        .map_err(|e| ScriptError::Runtime(format!("script task failed: {e}")))?
    }
}
