// src/exec/sink.rs

//! Output lanes and the pluggable sink that receives them.
//!
//! The engine never writes results itself; it hands a [`ResultSet`] to an
//! [`OutputSink`]. Production uses [`ChannelSink`] feeding a JSON-lines
//! writer on stdout; tests plug in a recording sink.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{ExecError, Result};

/// One of the three output channels of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Stdout,
    Stderr,
    Control,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Stdout => f.write_str("stdout"),
            Lane::Stderr => f.write_str("stderr"),
            Lane::Control => f.write_str("control"),
        }
    }
}

/// Messages for the three lanes, delivered together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub stdout: Vec<Value>,
    pub stderr: Option<Value>,
    pub control: Option<Value>,
}

impl ResultSet {
    pub fn stdout_chunk(msg: Value) -> Self {
        Self {
            stdout: vec![msg],
            ..Self::default()
        }
    }

    pub fn control(msg: Value) -> Self {
        Self {
            control: Some(msg),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_none() && self.control.is_none()
    }

    /// Flatten into `(lane, msg)` pairs: stdout first, then stderr, then control.
    pub fn into_lanes(self) -> Vec<(Lane, Value)> {
        let mut out: Vec<(Lane, Value)> =
            self.stdout.into_iter().map(|m| (Lane::Stdout, m)).collect();
        out.extend(self.stderr.map(|m| (Lane::Stderr, m)));
        out.extend(self.control.map(|m| (Lane::Control, m)));
        out
    }
}

/// Receiver of emitted results.
pub trait OutputSink: Send + Sync {
    fn send(&self, set: ResultSet) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// A single line of output: `{"lane": "...", "msg": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneMessage {
    pub lane: Lane,
    pub msg: Value,
}

/// Sink that forwards every message over an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<LaneMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<LaneMessage>) -> Self {
        Self { tx }
    }
}

impl OutputSink for ChannelSink {
    fn send(&self, set: ResultSet) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            for (lane, msg) in set.into_lanes() {
                tx.send(LaneMessage { lane, msg })
                    .await
                    .map_err(|e| ExecError::Sink(format!("{} lane: {e}", e.0.lane)))?;
            }
            Ok(())
        })
    }
}

/// Write every message from `rx` to `writer` as one JSON line, until all
/// senders are dropped.
pub fn spawn_line_writer<W>(mut rx: mpsc::Receiver<LaneMessage>, mut writer: W) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0usize;
        while let Some(line) = rx.recv().await {
            let mut text = match serde_json::to_string(&line) {
                Ok(text) => text,
                Err(e) => {
                    warn!(lane = %line.lane, error = %e, "dropping unserialisable message");
                    continue;
                }
            };
            text.push('\n');
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
            written += 1;
        }
        debug!(written, "output writer finished");
        Ok(())
    })
}
