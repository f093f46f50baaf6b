// src/exec/barrier.rs

//! Three-way completion join for a running process.
//!
//! A process is finished only once its stdout has closed, its stderr has
//! closed and the OS has reported its exit. The three signals arrive from
//! independent tasks in no particular order.

/// How the process ended, as reported by the OS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

#[derive(Debug)]
pub enum CompletionSignal {
    StdoutClosed(Vec<u8>),
    StderrClosed(Vec<u8>),
    Exited(ExitInfo),
}

/// Collected state once every signal has arrived.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: ExitInfo,
}

#[derive(Debug, Default)]
pub struct CompletionBarrier {
    stdout_closed: bool,
    stderr_closed: bool,
    process_closed: bool,
    finalized: bool,
    completion: Completion,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal. Returns `true` exactly once: on the call that
    /// completes the set. Repeated signals are ignored.
    pub fn observe(&mut self, signal: CompletionSignal) -> bool {
        match signal {
            CompletionSignal::StdoutClosed(bytes) if !self.stdout_closed => {
                self.stdout_closed = true;
                self.completion.stdout = bytes;
            }
            CompletionSignal::StderrClosed(bytes) if !self.stderr_closed => {
                self.stderr_closed = true;
                self.completion.stderr = bytes;
            }
            CompletionSignal::Exited(exit) if !self.process_closed => {
                self.process_closed = true;
                self.completion.exit = exit;
            }
            _ => {}
        }
        self.try_finalize()
    }

    fn try_finalize(&mut self) -> bool {
        if self.finalized || !self.is_complete() {
            return false;
        }
        self.finalized = true;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.stdout_closed && self.stderr_closed && self.process_closed
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn into_completion(self) -> Completion {
        self.completion
    }
}
