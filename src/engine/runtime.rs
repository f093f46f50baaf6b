// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::core::CoreRuntime;
use super::{CoreCommand, InvocationOutcome, RuntimeEvent, TriggerHandler};
use crate::errors::Result;

/// Drives invocations in response to `RuntimeEvent`s and delegates the
/// actual work to a `TriggerHandler`.
///
/// This is the async shell around `CoreRuntime`: it reads events from the
/// channel, spawns one task per invocation and reports their completion
/// back to the core.
pub struct Runtime<H: TriggerHandler> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    handler: Arc<H>,
    tasks: JoinSet<Result<InvocationOutcome>>,
}

impl<H: TriggerHandler> fmt::Debug for Runtime<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl<H: TriggerHandler> Runtime<H> {
    pub fn new(event_rx: mpsc::Receiver<RuntimeEvent>, handler: Arc<H>) -> Self {
        Self {
            core: CoreRuntime::new(),
            event_rx,
            handler,
            tasks: JoinSet::new(),
        }
    }

    /// Main event loop. Returns once input is exhausted and every invocation
    /// has finished, or after a shutdown request.
    pub async fn run(mut self) -> Result<()> {
        info!("execlane runtime started");
        let mut channel_open = true;

        loop {
            let event = tokio::select! {
                maybe = self.event_rx.recv(), if channel_open => match maybe {
                    Some(event) => event,
                    None => {
                        debug!("runtime event channel closed");
                        channel_open = false;
                        RuntimeEvent::InputClosed
                    }
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    log_invocation_result(joined);
                    RuntimeEvent::InvocationFinished
                }
                else => {
                    info!("nothing left to wait for; exiting");
                    break;
                }
            };

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await;
            }

            if !step.keep_running {
                info!(started = self.core.started(), "core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    async fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Invoke(event) => {
                let handler = Arc::clone(&self.handler);
                self.tasks.spawn(async move { handler.handle(event).await });
                debug!(in_flight = self.core.in_flight(), "invocation spawned");
            }
            CoreCommand::Shutdown => {
                info!(in_flight = self.core.in_flight(), "shutting down");
                self.handler.shutdown().await;
                self.tasks.shutdown().await;
            }
        }
    }
}

fn log_invocation_result(
    joined: std::result::Result<Result<InvocationOutcome>, tokio::task::JoinError>,
) {
    match joined {
        Ok(Ok(InvocationOutcome::Dropped)) => debug!("invocation dropped by pre-processing"),
        Ok(Ok(InvocationOutcome::Completed {
            pid,
            exit_code,
            classification,
            ..
        })) => debug!(pid, exit_code, %classification, "invocation completed"),
        Ok(Err(err)) => error!(error = %err, "invocation failed"),
        Err(e) if e.is_cancelled() => debug!("invocation task cancelled"),
        Err(e) => warn!(error = %e, "invocation task panicked"),
    }
}
