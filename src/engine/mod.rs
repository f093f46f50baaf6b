// src/engine/mod.rs

//! Orchestration engine for execlane.
//!
//! This module ties together:
//! - the per-invocation pipeline ([`node::ExecEngine`]): resolve, pre-script,
//!   spawn and stream, assemble, post-script, dispatch
//! - the runtime event loop that reacts to:
//!   - inbound trigger events
//!   - end of input
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::errors::Result;
use crate::types::Classification;

/// Events flowing into the runtime from the input reader and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A trigger event arrived; start one independent invocation.
    Triggered(Value),
    /// An invocation task finished (successfully or not).
    InvocationFinished,
    /// No more trigger events will arrive.
    InputClosed,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Result of one invocation as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The pre-processing script discarded the event; nothing was spawned.
    Dropped,
    Completed {
        pid: Option<u32>,
        exit_code: Option<i32>,
        classification: Classification,
        /// Non-fatal stdin write failure, if any.
        stdin_error: Option<String>,
    },
}

/// Something that processes trigger events.
///
/// Production code uses [`node::ExecEngine`]; tests can provide a fake that
/// records events instead of spawning processes.
pub trait TriggerHandler: Send + Sync + 'static {
    fn handle(
        &self,
        event: Value,
    ) -> Pin<Box<dyn Future<Output = Result<InvocationOutcome>> + Send + '_>>;

    /// Tear down: terminate everything still running.
    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

pub mod core;
pub mod node;
pub mod runtime;

pub use core::{CoreCommand, CoreRuntime, CoreStep};
pub use node::ExecEngine;
pub use runtime::Runtime;
