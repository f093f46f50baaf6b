// src/exec/shutdown.rs

//! Teardown of every tracked process: SIGTERM, a grace period, then SIGKILL
//! for whatever is still registered.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::registry::ProcessTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    Terminate,
    Kill,
}

/// Summary of a teardown pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Pids that received the graceful signal.
    pub terminated: Vec<u32>,
    /// Pids still registered after the grace period and sent SIGKILL.
    pub killed: Vec<u32>,
}

/// Terminate every registered process and clear the table.
///
/// Signal failures (typically: the process already exited) are logged and
/// ignored.
pub async fn terminate_all(table: &ProcessTable, grace: Duration) -> ShutdownReport {
    let entries = table.snapshot();
    if entries.is_empty() {
        debug!("no running processes to terminate");
        return ShutdownReport::default();
    }

    let mut report = ShutdownReport::default();
    for entry in &entries {
        info!(
            pid = entry.pid,
            command = %entry.command_line,
            running_ms = entry.started_at.elapsed().as_millis() as u64,
            "terminating process"
        );
        send_signal(entry.pid, TermSignal::Terminate);
        report.terminated.push(entry.pid);
    }

    if !table.wait_until_empty(grace).await {
        for entry in table.drain() {
            warn!(
                pid = entry.pid,
                grace_ms = grace.as_millis() as u64,
                "process ignored SIGTERM; sending SIGKILL"
            );
            send_signal(entry.pid, TermSignal::Kill);
            report.killed.push(entry.pid);
        }
    }

    table.drain();
    report
}

#[cfg(unix)]
pub fn send_signal(pid: u32, signal: TermSignal) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "pid out of range; not signalling");
        return;
    };
    let sig = match signal {
        TermSignal::Terminate => Signal::SIGTERM,
        TermSignal::Kill => Signal::SIGKILL,
    };
    if let Err(e) = kill(Pid::from_raw(raw), sig) {
        debug!(pid, signal = ?sig, error = %e, "signal not delivered");
    }
}

#[cfg(not(unix))]
pub fn send_signal(pid: u32, signal: TermSignal) {
    // No signals here; children are killed when their handles drop.
    debug!(pid, ?signal, "signals unsupported on this platform");
}
