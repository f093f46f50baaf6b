// src/script/mod.rs

//! Sandboxed transform scripts.
//!
//! A script is compiled once at configuration time into a [`Program`] and
//! evaluated per event by [`ScriptRunner`] on the blocking thread pool,
//! bounded by a wall-clock timeout.

pub mod interp;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod runner;
pub mod sandbox;
pub mod value;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use self::parser::Program;

pub use self::interp::Bindings;
pub use self::runner::ScriptRunner;
pub use self::sandbox::Sandbox;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{0}")]
    Runtime(String),

    #[error("script exceeded its time limit of {0:?}")]
    Timeout(Duration),

    #[error("module '{0}' is not available to scripts")]
    CapabilityDenied(String),
}

/// A compiled script. Cloning is cheap.
#[derive(Clone)]
pub struct Script {
    program: Arc<Program>,
}

impl Script {
    pub fn compile(source: &str) -> Result<Self, ScriptError> {
        let tokens = lexer::tokenize(source)?;
        let program = parser::parse_program(tokens)?;
        Ok(Self {
            program: Arc::new(program),
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("statements", &self.program.stmts.len())
            .finish_non_exhaustive()
    }
}
