#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use execlane::engine::{InvocationOutcome, TriggerHandler};
use execlane::errors::Result;
use execlane::exec::{Lane, OutputSink, ResultSet};
use execlane::host::StatusReporter;
use execlane::types::{Classification, Status};

/// Sink that keeps every emitted message, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(Lane, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<(Lane, Value)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn lane(&self, lane: Lane) -> Vec<Value> {
        self.all()
            .into_iter()
            .filter(|(l, _)| *l == lane)
            .map(|(_, m)| m)
            .collect()
    }

    /// The value at `field` of every message on `lane`.
    pub fn lane_field(&self, lane: Lane, field: &str) -> Vec<Value> {
        self.lane(lane)
            .into_iter()
            .map(|m| m.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Concatenated text of all streamed stdout chunks at `field`.
    pub fn stdout_text(&self, field: &str) -> String {
        self.lane_field(Lane::Stdout, field)
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }
}

impl OutputSink for RecordingSink {
    fn send(&self, set: ResultSet) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.messages.lock().unwrap().extend(set.into_lanes());
            Ok(())
        })
    }
}

/// Status reporter that keeps the full history of updates.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    history: Mutex<Vec<Status>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Status> {
        self.history.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.history().into_iter().map(|s| s.text).collect()
    }

    pub fn last(&self) -> Option<Status> {
        self.history.lock().unwrap().last().cloned()
    }
}

impl StatusReporter for RecordingStatus {
    fn update(&self, status: Status) {
        self.history.lock().unwrap().push(status);
    }
}

/// A fake trigger handler that:
/// - records every event it is handed
/// - completes immediately with a successful outcome
/// - counts shutdown calls
#[derive(Debug, Default)]
pub struct FakeHandler {
    handled: Mutex<Vec<Value>>,
    shutdowns: AtomicUsize,
    delay: Option<std::time::Duration>,
}

impl FakeHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every invocation sleeps for `delay` before completing.
    pub fn with_delay(delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn handled(&self) -> Vec<Value> {
        self.handled.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl TriggerHandler for FakeHandler {
    fn handle(
        &self,
        event: Value,
    ) -> Pin<Box<dyn Future<Output = Result<InvocationOutcome>> + Send + '_>> {
        Box::pin(async move {
            self.handled.lock().unwrap().push(event);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(InvocationOutcome::Completed {
                pid: None,
                exit_code: Some(0),
                classification: Classification::Success,
                stdin_error: None,
            })
        })
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        })
    }
}
