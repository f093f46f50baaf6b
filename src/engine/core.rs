// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! Consumes [`RuntimeEvent`]s and produces commands for the IO shell
//! (`engine::runtime::Runtime`). It owns no channels or tasks, so it can be
//! unit tested without Tokio.

use serde_json::Value;

use crate::engine::RuntimeEvent;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Start an independent invocation for this event.
    Invoke(Value),
    /// Terminate every running process.
    Shutdown,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn run(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn stop(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct CoreRuntime {
    in_flight: usize,
    input_closed: bool,
    started: u64,
}

impl CoreRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    /// Total invocations started so far.
    pub fn started(&self) -> u64 {
        self.started
    }

    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::Triggered(event) => {
                // Every trigger gets its own invocation; nothing is queued.
                self.in_flight += 1;
                self.started += 1;
                CoreStep::run(vec![CoreCommand::Invoke(event)])
            }
            RuntimeEvent::InvocationFinished => {
                self.in_flight = self.in_flight.saturating_sub(1);
                if self.input_closed && self.is_idle() {
                    CoreStep::stop(Vec::new())
                } else {
                    CoreStep::run(Vec::new())
                }
            }
            RuntimeEvent::InputClosed => {
                self.input_closed = true;
                if self.is_idle() {
                    CoreStep::stop(Vec::new())
                } else {
                    CoreStep::run(Vec::new())
                }
            }
            RuntimeEvent::ShutdownRequested => CoreStep::stop(vec![CoreCommand::Shutdown]),
        }
    }
}
