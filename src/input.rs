// src/input.rs

//! Reads trigger events as JSON lines and feeds them to the runtime.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::RuntimeEvent;

/// Parse one input line into a trigger event.
///
/// JSON objects are used as-is. Any other JSON value, or text that is not
/// JSON at all, is wrapped as `{"payload": ...}`. Blank lines yield `None`.
pub fn parse_event(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Some(Value::Object(map)),
        Ok(other) => Some(json!({ "payload": other })),
        Err(_) => Some(json!({ "payload": line.trim_end_matches(['\r', '\n']) })),
    }
}

/// Read events from `reader` until EOF (or a read error), then send
/// `InputClosed`.
///
/// Returns the number of events forwarded. Stops early (without error) if
/// the runtime has gone away.
pub async fn pump_events<R>(reader: R, tx: mpsc::Sender<RuntimeEvent>) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0u64;

    let result = loop {
        let line = match lines.next_line().await.context("reading trigger input") {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(count),
            Err(e) => break Err(e),
        };
        let Some(event) = parse_event(&line) else {
            continue;
        };
        if tx.send(RuntimeEvent::Triggered(event)).await.is_err() {
            debug!("runtime stopped; no longer reading input");
            return Ok(count);
        }
        count += 1;
    };

    info!(events = count, "input exhausted");
    // In-flight invocations still finish when reading fails.
    let _ = tx.send(RuntimeEvent::InputClosed).await;
    result
}
