// src/engine/node.rs

//! The per-invocation pipeline.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{InvocationOutcome, TriggerHandler};
use crate::config::NodeConfig;
use crate::errors::{ExecError, Result, ScriptStage};
use crate::exec::assemble::{self, Dispatcher};
use crate::exec::{self, OutputSink, ProcessTable, ResultSet};
use crate::host::{HostServices, StatusReporter};
use crate::message;
use crate::script::{Bindings, Sandbox, ScriptRunner};
use crate::types::{Status, StatusFill};

/// Runs the configured command once per trigger event.
///
/// Each call to [`ExecEngine::invoke`] is independent; any number may run
/// concurrently. The only shared state is the process table.
pub struct ExecEngine {
    config: Arc<NodeConfig>,
    config_view: Value,
    scripts: ScriptRunner,
    table: Arc<ProcessTable>,
    sink: Arc<dyn OutputSink>,
    status: Arc<dyn StatusReporter>,
}

impl std::fmt::Debug for ExecEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecEngine")
            .field("node", &self.config.name)
            .field("command", &self.config.command)
            .field("running", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl ExecEngine {
    pub fn new(config: NodeConfig, sink: Arc<dyn OutputSink>, host: HostServices) -> Self {
        let sandbox = Sandbox::new(
            config.name.as_str(),
            Arc::clone(&host.status),
            host.store,
            host.env,
        );
        let scripts = ScriptRunner::new(sandbox, config.script_timeout);
        let config_view = config.to_json();

        Self {
            config: Arc::new(config),
            config_view,
            scripts,
            table: Arc::new(ProcessTable::new()),
            sink,
            status: host.status,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn process_table(&self) -> &Arc<ProcessTable> {
        &self.table
    }

    fn set_status(&self, fill: StatusFill, text: &str) {
        self.status.update(Status::new(fill, text));
    }

    /// Run one invocation end to end.
    ///
    /// Fatal failures (configuration, scripts) are returned after setting a
    /// red status; a spawn failure is not fatal and completes normally with
    /// an `error` control result.
    pub async fn invoke(&self, event: Value) -> Result<InvocationOutcome> {
        match self.invoke_inner(event).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!(node = %self.config.name, error = %err, "invocation failed");
                self.set_status(StatusFill::Red, err.status_text());
                Err(err)
            }
        }
    }

    async fn invoke_inner(&self, event: Value) -> Result<InvocationOutcome> {
        let original = event.clone();

        self.set_status(StatusFill::Grey, "preprocessing...");
        let current = match self.pre_process(event).await? {
            Some(current) => current,
            None => {
                info!(node = %self.config.name, "pre-processing dropped the event");
                self.status.update(Status::cleared());
                return Ok(InvocationOutcome::Dropped);
            }
        };

        let request = exec::resolve(&self.config, &current)?;
        let command_line = request.command_line();

        self.set_status(StatusFill::Blue, "running...");
        info!(
            node = %self.config.name,
            command = %command_line,
            cwd = ?request.cwd,
            env_overlay = request.env.len(),
            "running command"
        );

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.sink),
            original,
            self.config.result_field.clone(),
        );
        let outcome =
            exec::run_process(&request, &self.table, &dispatcher, self.config.send_start_control)
                .await;

        self.set_status(StatusFill::Grey, "postprocessing...");

        let stderr = assemble::stderr_result(&dispatcher, &outcome);
        let control = assemble::control_result(&dispatcher, &outcome, &command_line);
        let control = if outcome.spawn_error.is_none() {
            self.post_process(&dispatcher, control).await?
        } else {
            Some(control)
        };

        dispatcher
            .finish(ResultSet {
                stdout: Vec::new(),
                stderr,
                control,
            })
            .await?;

        let classification = assemble::classify(&outcome, self.config.thresholds);
        self.status
            .update(assemble::final_status(&outcome, classification));

        Ok(InvocationOutcome::Completed {
            pid: outcome.pid,
            exit_code: outcome.exit_code,
            classification,
            stdin_error: outcome.stdin_error,
        })
    }

    /// Returns `None` when the script discarded the event.
    async fn pre_process(&self, event: Value) -> Result<Option<Value>> {
        let Some(script) = &self.config.pre_script else {
            return Ok(Some(event));
        };

        let bindings = Bindings {
            msg: event,
            original_msg: None,
            result_field: None,
            config: self.config_view.clone(),
        };
        let msg = self
            .scripts
            .run(script, bindings)
            .await
            .map_err(|e| ExecError::from_script(ScriptStage::Pre, e))?;

        match msg {
            Value::Null => Ok(None),
            Value::Object(_) => Ok(Some(msg)),
            other => Err(ExecError::ScriptRuntime {
                stage: ScriptStage::Pre,
                message: format!(
                    "msg must be an object or null, got a {}",
                    message::type_name(&other)
                ),
            }),
        }
    }

    /// Returns `None` when the script suppressed the control message.
    async fn post_process(&self, dispatcher: &Dispatcher, control: Value) -> Result<Option<Value>> {
        let Some(script) = &self.config.post_script else {
            return Ok(Some(control));
        };

        debug!(node = %self.config.name, "running post-processing script");
        let bindings = Bindings {
            msg: control.clone(),
            original_msg: Some(dispatcher.original().clone()),
            result_field: Some(self.config.result_field.to_string()),
            config: self.config_view.clone(),
        };
        let msg = self
            .scripts
            .run(script, bindings)
            .await
            .map_err(|e| ExecError::from_script(ScriptStage::Post, e))?;

        match msg {
            Value::Null => {
                debug!(node = %self.config.name, "post-processing suppressed the control message");
                Ok(None)
            }
            Value::Object(_) => Ok(Some(msg)),
            other => {
                warn!(
                    node = %self.config.name,
                    found = message::type_name(&other),
                    "post-processing produced a non-object; reverting to the original control message"
                );
                Ok(Some(control))
            }
        }
    }

    /// Terminate every running process and clear the status.
    pub async fn shutdown(&self) {
        self.status.update(Status::cleared());
        let report = exec::terminate_all(&self.table, self.config.shutdown_grace).await;
        info!(
            node = %self.config.name,
            terminated = report.terminated.len(),
            killed = report.killed.len(),
            "shutdown complete"
        );
    }
}

impl TriggerHandler for ExecEngine {
    fn handle(
        &self,
        event: Value,
    ) -> Pin<Box<dyn Future<Output = Result<InvocationOutcome>> + Send + '_>> {
        Box::pin(self.invoke(event))
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(ExecEngine::shutdown(self))
    }
}
