// src/exec/assemble.rs

//! Result assembly: turning a finished process into lane messages and a
//! status classification.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::process::ProcessOutcome;
use super::sink::{OutputSink, ResultSet};
use crate::config::Thresholds;
use crate::errors::Result;
use crate::message::PropertyPath;
use crate::types::{Classification, Status, StatusFill};

/// Builds lane messages for one invocation and hands them to the sink.
///
/// Every message is a copy of the original (pre-script) event with the
/// result written at `result_field`.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn OutputSink>,
    original: Arc<Value>,
    result_field: PropertyPath,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn OutputSink>, original: Value, result_field: PropertyPath) -> Self {
        Self {
            sink,
            original: Arc::new(original),
            result_field,
        }
    }

    pub fn original(&self) -> &Value {
        &self.original
    }

    /// Copy of the original event with `result` at the result field and,
    /// when known, a top-level `pid`.
    pub fn stamp(&self, result: Value, pid: Option<u32>) -> Value {
        let mut msg = match self.original.as_ref() {
            Value::Object(map) => Value::Object(map.clone()),
            _ => Value::Object(Map::new()),
        };
        self.result_field.put(&mut msg, result);
        if let (Some(pid), Value::Object(map)) = (pid, &mut msg) {
            map.insert("pid".to_string(), json!(pid));
        }
        msg
    }

    pub async fn start(&self, pid: u32) -> Result<()> {
        let msg = self.stamp(json!({ "state": "start", "pid": pid }), None);
        self.sink.send(ResultSet::control(msg)).await
    }

    pub async fn stdout_chunk(&self, pid: Option<u32>, text: String) -> Result<()> {
        let msg = self.stamp(Value::String(text), pid);
        self.sink.send(ResultSet::stdout_chunk(msg)).await
    }

    pub async fn finish(&self, set: ResultSet) -> Result<()> {
        if set.is_empty() {
            return Ok(());
        }
        self.sink.send(set).await
    }
}

/// Stderr message, present only when the process wrote to stderr.
pub fn stderr_result(dispatcher: &Dispatcher, outcome: &ProcessOutcome) -> Option<Value> {
    if outcome.stderr.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(&outcome.stderr).into_owned();
    Some(dispatcher.stamp(Value::String(text), outcome.pid))
}

/// The structured summary placed at the result field of the control message.
pub fn control_payload(outcome: &ProcessOutcome, command_line: &str) -> Value {
    let mut payload = json!({
        "state": if outcome.spawn_error.is_some() { "error" } else { "end" },
        "rc": if outcome.spawn_error.is_some() { None } else { outcome.exit_code },
        "pid": outcome.pid,
        "command": command_line,
        "stdout": String::from_utf8_lossy(&outcome.stdout),
        "stderr": String::from_utf8_lossy(&outcome.stderr),
    });
    if let Value::Object(map) = &mut payload {
        if let Some(err) = &outcome.spawn_error {
            map.insert("error".to_string(), json!(err));
        }
        if let Some(signal) = outcome.signal {
            map.insert("signal".to_string(), json!(signal));
        }
    }
    payload
}

pub fn control_result(dispatcher: &Dispatcher, outcome: &ProcessOutcome, command_line: &str) -> Value {
    dispatcher.stamp(control_payload(outcome, command_line), outcome.pid)
}

/// Classify a finished process.
///
/// Order: spawn error, exit 0, warning range `warning..error`, at or above
/// the error threshold, otherwise success. A process killed by a signal has
/// no exit code and counts as an error.
pub fn classify(outcome: &ProcessOutcome, thresholds: Thresholds) -> Classification {
    if outcome.spawn_error.is_some() {
        return Classification::Error;
    }
    match outcome.exit_code {
        Some(code) => classify_exit_code(code, thresholds),
        None => Classification::Error,
    }
}

pub fn classify_exit_code(code: i32, thresholds: Thresholds) -> Classification {
    if code == 0 {
        Classification::Success
    } else if thresholds
        .warning
        .is_some_and(|w| code >= w && code < thresholds.error)
    {
        Classification::Warning
    } else if code >= thresholds.error {
        Classification::Error
    } else {
        Classification::Success
    }
}

/// Terminal status shown once an invocation finishes.
pub fn final_status(outcome: &ProcessOutcome, classification: Classification) -> Status {
    let fill = StatusFill::from(classification);
    if outcome.spawn_error.is_some() {
        return Status::new(fill, "spawn error");
    }
    let code = match (outcome.exit_code, outcome.signal) {
        (Some(code), _) => code.to_string(),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "?".to_string(),
    };
    let text = match classification {
        Classification::Success => format!("done ({code})"),
        Classification::Warning => format!("warning ({code})"),
        Classification::Error => format!("error ({code})"),
    };
    Status::new(fill, text)
}

/// Incremental UTF-8 decoder for streamed chunks.
///
/// A multi-byte character split across two reads is held back until the
/// rest arrives, so the concatenation of decoded chunks matches decoding the
/// whole stream at once.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let keep = incomplete_suffix_len(&self.pending);
        let split = self.pending.len() - keep;
        let tail = self.pending.split_off(split);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }

    /// Flush whatever is still held back (an unfinished sequence at EOF).
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a trailing, incomplete (but so far valid) UTF-8 sequence.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => 0,
        Err(e) if e.error_len().is_none() => bytes.len() - e.valid_up_to(),
        Err(_) => {
            // An invalid sequence somewhere; only hold back a trailing
            // fragment that could still complete.
            let start = bytes.len().saturating_sub(3);
            (start..bytes.len())
                .find(|&i| {
                    let width = match bytes[i] {
                        b if b & 0b1110_0000 == 0b1100_0000 => 2,
                        b if b & 0b1111_0000 == 0b1110_0000 => 3,
                        b if b & 0b1111_1000 == 0b1111_0000 => 4,
                        _ => return false,
                    };
                    bytes.len() - i < width
                        && bytes[i + 1..].iter().all(|c| c & 0b1100_0000 == 0b1000_0000)
                })
                .map(|i| bytes.len() - i)
                .unwrap_or(0)
        }
    }
}
