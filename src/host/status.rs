// src/host/status.rs

use std::sync::Mutex;

use tracing::info;

use crate::types::Status;

/// Receives discrete status updates for the node.
pub trait StatusReporter: Send + Sync {
    fn update(&self, status: Status);
}

/// Logs every status change and remembers the latest one.
#[derive(Debug, Default)]
pub struct TracingStatus {
    node: String,
    current: Mutex<Option<Status>>,
}

impl TracingStatus {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            current: Mutex::new(None),
        }
    }

    pub fn current(&self) -> Option<Status> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl StatusReporter for TracingStatus {
    fn update(&self, status: Status) {
        if status.is_cleared() {
            info!(node = %self.node, "status cleared");
        } else {
            info!(node = %self.node, fill = ?status.fill, text = %status.text, "status");
        }
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
    }
}
