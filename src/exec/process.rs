// src/exec/process.rs

//! Process lifecycle: spawn, feed stdin, stream stdout, buffer stderr and
//! join on completion.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::assemble::{ChunkDecoder, Dispatcher};
use super::barrier::{CompletionBarrier, CompletionSignal, ExitInfo};
use super::registry::ProcessTable;
use super::resolve::ExecutionRequest;
use crate::errors::ExecError;
use crate::types::InputMode;

const READ_CHUNK: usize = 8 * 1024;

/// Everything the assembler needs once a process has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub spawn_error: Option<String>,
    /// Writing the payload to stdin failed; the process still ran.
    pub stdin_error: Option<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutcome {
    pub fn spawn_failed(error: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Spawn `request` and drive it to completion.
///
/// Never fails: a spawn failure is captured in the outcome and flows
/// through the same completion path as a normal exit.
pub async fn run_process(
    request: &ExecutionRequest,
    table: &Arc<ProcessTable>,
    dispatcher: &Dispatcher,
    send_start: bool,
) -> ProcessOutcome {
    let command_line = request.command_line();

    let stdin = match request.input {
        InputMode::Pipe => Stdio::piped(),
        InputMode::Argument | InputMode::None => Stdio::null(),
    };

    let mut cmd = Command::new(&request.command);
    cmd.args(&request.args)
        .envs(&request.env)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &request.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            let err = ExecError::Spawn {
                command: command_line.clone(),
                source,
            };
            error!(command = %command_line, error = %err, "spawn failed");
            return ProcessOutcome::spawn_failed(err.to_string());
        }
    };

    let pid = child.id();
    if let Some(pid) = pid {
        table.register(pid, command_line.as_str());
    }
    info!(pid, command = %command_line, "process started");

    if send_start {
        if let Some(pid) = pid {
            if let Err(e) = dispatcher.start(pid).await {
                warn!(pid, error = %e, "failed to emit start control message");
            }
        }
    }

    let stdin_task = match (child.stdin.take(), request.stdin.clone()) {
        (Some(mut stdin), Some(bytes)) => Some(tokio::spawn(async move {
            stdin.write_all(&bytes).await?;
            stdin.shutdown().await
        })),
        // Pipe mode without a payload: dropping the handle closes stdin.
        _ => None,
    };

    let (tx, mut rx) = mpsc::channel::<CompletionSignal>(3);

    match child.stdout.take() {
        Some(stdout) => {
            let tx = tx.clone();
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let buf = stream_stdout(stdout, pid, &dispatcher).await;
                let _ = tx.send(CompletionSignal::StdoutClosed(buf)).await;
            });
        }
        None => {
            let _ = tx.send(CompletionSignal::StdoutClosed(Vec::new())).await;
        }
    }

    match child.stderr.take() {
        Some(stderr) => {
            let tx = tx.clone();
            tokio::spawn(async move {
                let buf = read_all(stderr, pid, "stderr").await;
                let _ = tx.send(CompletionSignal::StderrClosed(buf)).await;
            });
        }
        None => {
            let _ = tx.send(CompletionSignal::StderrClosed(Vec::new())).await;
        }
    }

    {
        let tx = tx.clone();
        let table = Arc::clone(table);
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => ExitInfo::from_status(status),
                Err(e) => {
                    error!(pid, error = %e, "failed waiting for process");
                    ExitInfo::default()
                }
            };
            if let Some(pid) = pid {
                table.remove(pid);
            }
            info!(pid, code = exit.code, signal = exit.signal, "process exited");
            let _ = tx.send(CompletionSignal::Exited(exit)).await;
        });
    }
    drop(tx);

    let mut barrier = CompletionBarrier::new();
    while let Some(signal) = rx.recv().await {
        if barrier.observe(signal) {
            break;
        }
    }
    if !barrier.is_finalized() {
        warn!(pid, "completion signals ended early; finalising with partial state");
    }
    let completion = barrier.into_completion();

    let stdin_error = join_stdin(stdin_task, pid).await;

    ProcessOutcome {
        pid,
        exit_code: completion.exit.code,
        signal: completion.exit.signal,
        spawn_error: None,
        stdin_error,
        stdout: completion.stdout,
        stderr: completion.stderr,
    }
}

/// Read stdout to EOF, forwarding each chunk as it arrives.
async fn stream_stdout<R>(mut reader: R, pid: Option<u32>, dispatcher: &Dispatcher) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut decoder = ChunkDecoder::new();

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(pid, error = %e, "stdout read failed; treating stream as closed");
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);
        let text = decoder.push(&chunk[..n]);
        emit_chunk(dispatcher, pid, text).await;
    }
    emit_chunk(dispatcher, pid, decoder.finish()).await;

    debug!(pid, bytes = buf.len(), "stdout closed");
    buf
}

async fn emit_chunk(dispatcher: &Dispatcher, pid: Option<u32>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Err(e) = dispatcher.stdout_chunk(pid, text).await {
        warn!(pid, error = %e, "failed to emit stdout chunk");
    }
}

async fn read_all<R>(mut reader: R, pid: Option<u32>, stream: &'static str) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        warn!(pid, stream, error = %e, "read failed; treating stream as closed");
    }
    debug!(pid, stream, bytes = buf.len(), "stream closed");
    buf
}

async fn join_stdin(task: Option<JoinHandle<std::io::Result<()>>>, pid: Option<u32>) -> Option<String> {
    let result = match task?.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e)),
    };
    match result {
        Ok(()) => None,
        Err(source) => {
            let err = ExecError::StreamWrite(source);
            warn!(pid, error = %err, "stdin write failed; process continued");
            Some(err.to_string())
        }
    }
}
