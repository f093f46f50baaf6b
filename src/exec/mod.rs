// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`resolve`] derives the command, arguments, working directory,
//!   environment overlay and stdin bytes from configuration and an event.
//! - [`process`] spawns the command and drives its I/O to completion, using
//!   the three-way join in [`barrier`].
//! - [`registry`] tracks every live process by pid.
//! - [`assemble`] builds lane messages and classifies the outcome.
//! - [`sink`] defines the output lanes and the `OutputSink` trait.
//! - [`shutdown`] terminates everything still running on teardown.

pub mod assemble;
pub mod barrier;
pub mod process;
pub mod registry;
pub mod resolve;
pub mod shutdown;
pub mod sink;

pub use assemble::{classify, classify_exit_code, Dispatcher};
pub use process::{run_process, ProcessOutcome};
pub use registry::ProcessTable;
pub use resolve::{resolve, ExecutionRequest};
pub use shutdown::{terminate_all, ShutdownReport};
pub use sink::{ChannelSink, Lane, LaneMessage, OutputSink, ResultSet};
