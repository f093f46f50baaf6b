// tests/exec_end_to_end.rs

mod common;
use crate::common::{init_tracing, with_timeout, NodeConfigBuilder, TestEngine, TestResult};

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use execlane::engine::InvocationOutcome;
use execlane::errors::ExecError;
use execlane::exec::Lane;
use execlane::types::{Classification, InputMode, Status, StatusFill};

fn sh(script: &str) -> Value {
    json!({ "payload": ["-c", script] })
}

fn completed(outcome: InvocationOutcome) -> (Option<u32>, Option<i32>, Classification) {
    match outcome {
        InvocationOutcome::Completed {
            pid,
            exit_code,
            classification,
            ..
        } => (pid, exit_code, classification),
        other => panic!("expected a completed invocation, got {other:?}"),
    }
}

#[tokio::test]
async fn echo_splits_string_arguments_and_succeeds() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("echo").build());

    let outcome = with_timeout(t.engine.invoke(json!({ "payload": "hello world" }))).await?;
    let (pid, exit_code, classification) = completed(outcome);

    assert!(pid.is_some());
    assert_eq!(exit_code, Some(0));
    assert_eq!(classification, Classification::Success);

    let control = t.sink.lane(Lane::Control);
    assert_eq!(control.len(), 1);
    let result = &control[0]["payload"];
    assert_eq!(result["state"], "end");
    assert_eq!(result["rc"], 0);
    assert_eq!(result["stdout"], "hello world\n");
    assert_eq!(result["stderr"], "");
    assert_eq!(result["command"], "echo hello world");
    assert_eq!(result["pid"], json!(pid));
    assert!(result.get("error").is_none());

    assert!(t.sink.lane(Lane::Stderr).is_empty());
    assert_eq!(t.sink.stdout_text("payload"), "hello world\n");

    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Green, "done (0)")));
    assert!(t.engine.process_table().is_empty());
    Ok(())
}

#[tokio::test]
async fn status_moves_through_every_stage() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("true").arguments_source("args").build());

    with_timeout(t.engine.invoke(json!({}))).await?;

    assert_eq!(
        t.status.texts(),
        vec!["preprocessing...", "running...", "postprocessing...", "done (0)"]
    );
    Ok(())
}

#[tokio::test]
async fn piped_payload_is_echoed_by_cat() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("cat")
        .arguments_source("args")
        .input(InputMode::Pipe)
        .build();
    let t = TestEngine::new(cfg);

    with_timeout(t.engine.invoke(json!({ "payload": "abc" }))).await?;

    let chunks = t.sink.lane_field(Lane::Stdout, "payload");
    assert_eq!(chunks, vec![json!("abc")]);

    let control = t.sink.lane(Lane::Control);
    assert_eq!(control[0]["payload"]["stdout"], "abc");
    assert_eq!(control[0]["payload"]["rc"], 0);
    Ok(())
}

#[tokio::test]
async fn buffer_payload_is_written_as_raw_bytes() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("cat")
        .arguments_source("args")
        .input(InputMode::Pipe)
        .build();
    let t = TestEngine::new(cfg);

    let event = json!({ "payload": { "type": "Buffer", "data": [104, 105, 10] } });
    with_timeout(t.engine.invoke(event)).await?;

    assert_eq!(t.sink.lane(Lane::Control)[0]["payload"]["stdout"], "hi\n");
    Ok(())
}

#[tokio::test]
async fn argument_mode_closes_stdin_immediately() -> TestResult {
    init_tracing();
    // `cat` with no arguments would block forever if stdin stayed open.
    let cfg = NodeConfigBuilder::new("cat").arguments_source("args").build();
    let t = TestEngine::new(cfg);

    let outcome = with_timeout(t.engine.invoke(json!({ "payload": "ignored" }))).await?;
    let (_, exit_code, _) = completed(outcome);

    assert_eq!(exit_code, Some(0));
    assert_eq!(t.sink.lane(Lane::Control)[0]["payload"]["stdout"], "");
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn only_pipe_mode_attaches_a_pipe_to_stdin() -> TestResult {
    init_tracing();
    let read_fd0 = json!({ "args": ["-c", "readlink /proc/$$/fd/0"] });

    for (mode, expect_pipe) in [
        (InputMode::Argument, false),
        (InputMode::None, false),
        (InputMode::Pipe, true),
    ] {
        let cfg = NodeConfigBuilder::new("sh").arguments_source("args").input(mode).build();
        let t = TestEngine::new(cfg);
        with_timeout(t.engine.invoke(read_fd0.clone())).await?;

        let stdout = t.sink.lane(Lane::Control)[0]["payload"]["stdout"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if expect_pipe {
            assert!(stdout.starts_with("pipe:"), "{mode:?}: {stdout}");
        } else {
            assert_eq!(stdout, "/dev/null\n", "{mode:?}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn missing_command_is_a_configuration_error_without_output() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("").build());

    let result = with_timeout(t.engine.invoke(json!({ "payload": "x" }))).await;

    match result {
        Err(ExecError::NoCommand) => {}
        other => panic!("expected NoCommand, got {other:?}"),
    }
    assert!(t.sink.is_empty());
    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Red, "no command")));
    Ok(())
}

#[tokio::test]
async fn spawn_failure_produces_error_control_result() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("execlane-no-such-binary-0b7c")
        // Never runs: post-processing is skipped after a spawn failure.
        .post_script("msg = undefined_variable;")
        .build();
    let t = TestEngine::new(cfg);

    let outcome = with_timeout(t.engine.invoke(json!({ "payload": "a b" }))).await?;
    let (pid, exit_code, classification) = completed(outcome);

    assert_eq!(pid, None);
    assert_eq!(exit_code, None);
    assert_eq!(classification, Classification::Error);

    assert!(t.sink.lane(Lane::Stdout).is_empty());
    assert!(t.sink.lane(Lane::Stderr).is_empty());
    let control = t.sink.lane(Lane::Control);
    assert_eq!(control.len(), 1);
    let result = &control[0]["payload"];
    assert_eq!(result["state"], "error");
    assert_eq!(result["rc"], Value::Null);
    assert!(result["error"].as_str().is_some_and(|e| e.contains("execlane-no-such-binary-0b7c")));

    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Red, "spawn error")));
    assert!(t.engine.process_table().is_empty());
    Ok(())
}

#[tokio::test]
async fn streamed_chunks_concatenate_to_control_stdout() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("sh").build());

    let event = sh("printf one; sleep 0.2; printf two; sleep 0.2; printf three");
    with_timeout(t.engine.invoke(event)).await?;

    let chunks = t.sink.lane_field(Lane::Stdout, "payload");
    assert!(chunks.len() >= 2, "expected several chunks, got {chunks:?}");
    assert_eq!(t.sink.stdout_text("payload"), "onetwothree");

    let control = t.sink.lane(Lane::Control);
    assert_eq!(control[0]["payload"]["stdout"], "onetwothree");

    // The control result comes strictly after every chunk.
    let lanes: Vec<Lane> = t.sink.all().into_iter().map(|(lane, _)| lane).collect();
    assert_eq!(lanes.last(), Some(&Lane::Control));
    Ok(())
}

#[tokio::test]
async fn stderr_is_delivered_once_in_full() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("sh").build());

    let event = sh("echo first >&2; sleep 0.1; echo second >&2; exit 3");
    let outcome = with_timeout(t.engine.invoke(event)).await?;
    let (pid, exit_code, classification) = completed(outcome);

    assert_eq!(exit_code, Some(3));
    assert_eq!(classification, Classification::Error);

    let stderr = t.sink.lane(Lane::Stderr);
    assert_eq!(stderr.len(), 1);
    assert_eq!(stderr[0]["payload"], "first\nsecond\n");
    assert_eq!(stderr[0]["pid"], json!(pid));

    let control = &t.sink.lane(Lane::Control)[0]["payload"];
    assert_eq!(control["stderr"], "first\nsecond\n");
    assert_eq!(control["rc"], 3);
    assert_eq!(control["state"], "end");

    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Red, "error (3)")));
    Ok(())
}

#[tokio::test]
async fn warning_threshold_classifies_exit_codes() -> TestResult {
    init_tracing();
    let cfg = || {
        NodeConfigBuilder::new("sh")
            .warning_threshold(2)
            .error_threshold(5)
            .build()
    };

    for (code, expected, text, fill) in [
        (1, Classification::Success, "done (1)", StatusFill::Green),
        (2, Classification::Warning, "warning (2)", StatusFill::Yellow),
        (4, Classification::Warning, "warning (4)", StatusFill::Yellow),
        (5, Classification::Error, "error (5)", StatusFill::Red),
    ] {
        let t = TestEngine::new(cfg());
        let outcome = with_timeout(t.engine.invoke(sh(&format!("exit {code}")))).await?;
        let (_, exit_code, classification) = completed(outcome);

        assert_eq!(exit_code, Some(code));
        assert_eq!(classification, expected, "exit code {code}");
        assert_eq!(t.status.last(), Some(Status::new(fill, text)));
    }
    Ok(())
}

#[tokio::test]
async fn start_control_precedes_output() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo").send_start_control(true).build();
    let t = TestEngine::new(cfg);

    with_timeout(t.engine.invoke(json!({ "payload": "hi" }))).await?;

    let all = t.sink.all();
    assert_eq!(all.first().map(|(lane, _)| *lane), Some(Lane::Control));
    let start = &all[0].1["payload"];
    assert_eq!(start["state"], "start");

    let control = t.sink.lane(Lane::Control);
    assert_eq!(control.len(), 2);
    assert_eq!(control[1]["payload"]["state"], "end");
    assert_eq!(start["pid"], control[1]["payload"]["pid"]);
    Ok(())
}

#[tokio::test]
async fn messages_copy_the_original_event() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo")
        .arguments_source("req.args")
        .result_field("out.result")
        .build();
    let t = TestEngine::new(cfg);

    let event = json!({ "topic": "jobs", "req": { "args": ["x", 1, true] } });
    with_timeout(t.engine.invoke(event)).await?;

    let control = &t.sink.lane(Lane::Control)[0];
    assert_eq!(control["topic"], "jobs");
    assert_eq!(control["req"]["args"], json!(["x", 1, true]));
    assert_eq!(control["out"]["result"]["stdout"], "x 1 true\n");
    assert!(control["pid"].is_u64());

    let chunk = &t.sink.lane(Lane::Stdout)[0];
    assert_eq!(chunk["topic"], "jobs");
    assert!(chunk["out"]["result"].is_string());
    Ok(())
}

#[tokio::test]
async fn env_overlay_and_working_directory_apply() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = NodeConfigBuilder::new("sh")
        .env_source("env")
        .cwd("${dir}")
        .build();
    let t = TestEngine::new(cfg);

    let event = json!({
        "payload": ["-c", "echo \"$GREETING\"; pwd"],
        "env": { "GREETING": "hi there" },
        "dir": dir.path().to_string_lossy(),
    });
    with_timeout(t.engine.invoke(event)).await?;

    let stdout = t.sink.lane(Lane::Control)[0]["payload"]["stdout"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("hi there"));
    let pwd = std::fs::canonicalize(lines.next().unwrap_or_default())?;
    assert_eq!(pwd, std::fs::canonicalize(dir.path())?);
    Ok(())
}

#[tokio::test]
async fn unresolvable_working_directory_aborts_before_spawn() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo").cwd("/tmp/${job.dir}").build();
    let t = TestEngine::new(cfg);

    let result = with_timeout(t.engine.invoke(json!({ "payload": "x" }))).await;

    assert!(matches!(result, Err(ExecError::WorkingDirectory { .. })));
    assert!(t.sink.is_empty());
    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Red, "invalid cwd")));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn signal_termination_is_an_error() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("sh").build());

    let outcome = with_timeout(t.engine.invoke(sh("kill -9 $$"))).await?;
    let (_, exit_code, classification) = completed(outcome);

    assert_eq!(exit_code, None);
    assert_eq!(classification, Classification::Error);
    let control = &t.sink.lane(Lane::Control)[0]["payload"];
    assert_eq!(control["signal"], 9);
    assert_eq!(control["rc"], Value::Null);
    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Red, "error (signal 9)")));
    Ok(())
}

#[tokio::test]
async fn nested_result_field_overwrites_a_scalar_payload() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo").result_field("payload.result").build();
    let t = TestEngine::new(cfg);

    with_timeout(t.engine.invoke(json!({ "payload": "hi" }))).await?;

    let control = t.sink.lane(Lane::Control);
    assert_eq!(control.len(), 1);
    assert_eq!(control[0]["payload"]["result"]["stdout"], "hi\n");
    assert_eq!(control[0]["payload"]["result"]["rc"], 0);
    let streamed: String = t
        .sink
        .lane(Lane::Stdout)
        .iter()
        .filter_map(|m| m["payload"]["result"].as_str().map(str::to_string))
        .collect();
    assert_eq!(streamed, "hi\n");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn exit_releases_the_pid_before_inherited_pipes_close() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("sh").build());
    let engine = Arc::new(t.engine);

    let invocation = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.invoke(sh("sleep 1 & echo started; exit 0")).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(engine.process_table().is_empty(), "pid should be gone once sh exits");
    assert!(!invocation.is_finished(), "streams are still held open by the background sleep");
    assert!(t.sink.lane(Lane::Control).is_empty());

    let outcome = with_timeout(invocation).await??;
    let (_, exit_code, classification) = completed(outcome);
    assert_eq!(exit_code, Some(0));
    assert_eq!(classification, Classification::Success);

    let control = t.sink.lane(Lane::Control);
    assert_eq!(control.len(), 1);
    assert_eq!(control[0]["payload"]["state"], "end");
    assert_eq!(control[0]["payload"]["stdout"], "started\n");
    Ok(())
}

#[tokio::test]
async fn concurrent_invocations_are_independent() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("sh").build());

    let (a, b) = with_timeout(async {
        tokio::join!(
            t.engine.invoke(sh("sleep 0.2; echo a")),
            t.engine.invoke(sh("echo b"))
        )
    })
    .await;
    let (pid_a, ..) = completed(a?);
    let (pid_b, ..) = completed(b?);
    assert_ne!(pid_a, pid_b);

    let control = t.sink.lane(Lane::Control);
    assert_eq!(control.len(), 2);
    for msg in control {
        let expected = if msg["pid"] == json!(pid_a) { "a\n" } else { "b\n" };
        assert_eq!(msg["payload"]["stdout"], expected);
    }
    assert!(t.engine.process_table().is_empty());
    Ok(())
}
