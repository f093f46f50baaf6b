// src/exec/registry.rs

//! Table of processes that have been spawned and not yet reaped.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, warn};

/// Bookkeeping for one registered process.
#[derive(Debug, Clone)]
pub struct RegisteredProcess {
    pub pid: u32,
    pub command_line: String,
    pub started_at: Instant,
}

/// Process-wide registry keyed by pid.
///
/// An entry is inserted right after a successful spawn and removed when the
/// OS reports the exit (not when the output streams close). The shutdown
/// handler iterates and clears it.
#[derive(Debug, Default)]
pub struct ProcessTable {
    entries: Mutex<HashMap<u32, RegisteredProcess>>,
    changed: Notify,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, RegisteredProcess>> {
        // A poisoned lock only means another task panicked mid-update; the
        // map itself is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, pid: u32, command_line: impl Into<String>) {
        let entry = RegisteredProcess {
            pid,
            command_line: command_line.into(),
            started_at: Instant::now(),
        };
        if self.lock().insert(pid, entry).is_some() {
            warn!(pid, "pid registered twice; replacing stale entry");
        }
        debug!(pid, "process registered");
    }

    /// Remove `pid`. Returns the entry if it was still registered.
    pub fn remove(&self, pid: u32) -> Option<RegisteredProcess> {
        let removed = self.lock().remove(&pid);
        if removed.is_some() {
            debug!(pid, "process unregistered");
            self.changed.notify_waiters();
        }
        removed
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains_key(&pid)
    }

    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.lock().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn snapshot(&self) -> Vec<RegisteredProcess> {
        let mut entries: Vec<_> = self.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.pid);
        entries
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<RegisteredProcess> {
        let drained: Vec<_> = self.lock().drain().map(|(_, e)| e).collect();
        if !drained.is_empty() {
            self.changed.notify_waiters();
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait until the table is empty or `timeout` elapses. Returns `true`
    /// when the table emptied in time.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register interest before checking so a removal between the
            // check and the await is not missed.
            notified.as_mut().enable();

            if self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_empty();
            }
        }
    }
}
