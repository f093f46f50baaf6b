// tests/scripts.rs

mod common;
use crate::common::{init_tracing, with_timeout, NodeConfigBuilder, RecordingStatus, TestEngine, TestResult};

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use execlane::engine::InvocationOutcome;
use execlane::errors::{ExecError, ScriptStage};
use execlane::exec::Lane;
use execlane::host::{ContextStore, MemoryStore, StaticEnv, StoreTier};
use execlane::script::{interp, Bindings, Sandbox, Script, ScriptError};
use execlane::types::{Status, StatusFill};

struct Harness {
    sandbox: Sandbox,
    status: Arc<RecordingStatus>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let status = Arc::new(RecordingStatus::new());
    let store = Arc::new(MemoryStore::new());
    let env = StaticEnv::new().with("REGION", "eu-west");
    let sandbox = Sandbox::new("script-node", status.clone(), store.clone(), Arc::new(env));
    Harness {
        sandbox,
        status,
        store,
    }
}

fn run(h: &Harness, source: &str, msg: Value) -> Result<Value, ScriptError> {
    let script = Script::compile(source)?;
    let bindings = Bindings {
        msg,
        ..Bindings::default()
    };
    interp::execute(script.program(), &h.sandbox, bindings, Duration::from_millis(500))
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

#[test]
fn mutates_nested_fields_and_creates_missing_objects() -> TestResult {
    let h = harness();
    let out = run(
        &h,
        r#"
        let parts = msg.payload.split(",");
        msg.meta.count = parts.length;
        msg.meta.first = parts[0].trim().upper();
        msg.payload = parts.join(" ");
        "#,
        json!({ "payload": "a, b,c" }),
    )?;

    assert_eq!(out["payload"], "a  b c");
    assert_eq!(out["meta"]["count"], 3);
    assert_eq!(out["meta"]["first"], "A");
    Ok(())
}

#[test]
fn control_flow_and_arithmetic() -> TestResult {
    let h = harness();
    let out = run(
        &h,
        r#"
        let i = 0;
        let total = 0;
        while i < 5 {
            i = i + 1;
            if i % 2 == 0 { total = total + i; } else if i == 5 { total = total * 10; }
        }
        msg.total = total;
        msg.half = 7 / 2;
        msg.label = "n=" + str(total);
        "#,
        json!({}),
    )?;

    assert_eq!(out["total"], 60);
    assert_eq!(out["half"], 3.5);
    assert_eq!(out["label"], "n=60");
    Ok(())
}

#[test]
fn return_stops_early_and_null_discards() -> TestResult {
    let h = harness();
    let out = run(
        &h,
        r#"
        if msg.payload == "skip" { msg = null; return; }
        msg.seen = true;
        "#,
        json!({ "payload": "skip" }),
    )?;
    assert_eq!(out, Value::Null);

    let out = run(&h, "if msg.payload == \"skip\" { msg = null; return; } msg.seen = true;", json!({ "payload": "keep" }))?;
    assert_eq!(out["seen"], true);
    Ok(())
}

#[test]
fn delete_removes_fields() -> TestResult {
    let h = harness();
    let out = run(&h, "delete msg.secret; delete msg.list[0];", json!({ "secret": 1, "list": [1, 2], "keep": 3 }))?;
    assert_eq!(out, json!({ "list": [2], "keep": 3 }));
    Ok(())
}

#[test]
fn runtime_errors_carry_the_line_number() {
    let h = harness();
    let err = run(&h, "msg.a = 1;\nmsg.b = missing + 1;", json!({})).unwrap_err();
    match err {
        ScriptError::Runtime(message) => {
            assert!(message.starts_with("line 2:"), "{message}");
            assert!(message.contains("missing"), "{message}");
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn syntax_errors_are_reported_at_compile_time() {
    let err = Script::compile("msg.a = ;").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax { line: 1, .. }), "{err:?}");

    let err = Script::compile("if true {\n msg.a = 1;\n").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax { .. }), "{err:?}");
}

#[test]
fn reserved_names_cannot_be_rebound() {
    let h = harness();
    for source in ["let msg = 1;", "let env = 1;", "let len = 2;", "config = 1;", "context = 1;"] {
        let err = run(&h, source, json!({})).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)), "{source}: {err:?}");
    }
}

#[test]
fn division_by_zero_is_an_error() {
    let h = harness();
    assert!(matches!(run(&h, "msg.x = 1 / 0;", json!({})), Err(ScriptError::Runtime(_))));
}

#[test]
fn unbounded_loop_times_out() {
    let h = harness();
    let script = Script::compile("while true { }").unwrap();
    let limit = Duration::from_millis(50);
    let err = interp::execute(script.program(), &h.sandbox, Bindings::default(), limit).unwrap_err();
    assert_eq!(err, ScriptError::Timeout(limit));
}

fn runtime_message(source: &str) -> String {
    let h = harness();
    let script = Script::compile(source).unwrap();
    let bindings = Bindings {
        msg: json!({}),
        ..Bindings::default()
    };
    match interp::execute(script.program(), &h.sandbox, bindings, Duration::from_secs(30)) {
        Err(ScriptError::Runtime(message)) => message,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn doubling_an_array_hits_the_size_limit_before_the_deadline() {
    let message = runtime_message(
        "let a = [0];\nlet i = 0;\nwhile i < 64 { a = a + a; i = i + 1; }\nmsg.n = len(a);",
    );
    assert!(message.contains("array too large"), "{message}");
}

#[test]
fn copying_a_large_value_hits_the_footprint_limit() {
    let message = runtime_message(
        "let s = \"abcdefgh\";\nwhile len(s) < 250000 { s = s + s; }\nlet a = [s];\nwhile true { a = [a, a]; }",
    );
    assert!(message.contains("value too large"), "{message}");
}

#[test]
fn deep_nesting_is_rejected() {
    let message = runtime_message("let a = 0;\nwhile true { a = [a]; }");
    assert!(message.contains("nested too deeply"), "{message}");
}

#[test]
fn growing_the_message_in_place_is_bounded() {
    let message = runtime_message(
        "let s = \"abcdefgh\";\nwhile len(s) < 1000000 { s = s + s; }\nlet i = 0;\nwhile true { msg[str(i)] = s; i = i + 1; }",
    );
    assert!(message.contains("value too large"), "{message}");
}

#[test]
fn forbidden_modules_are_denied() {
    let h = harness();
    for name in ["fs", "child_process", "net", "http"] {
        let err = run(&h, &format!("let m = require(\"{name}\");"), json!({})).unwrap_err();
        assert_eq!(err, ScriptError::CapabilityDenied(name.to_string()));
    }
}

#[test]
fn allowed_modules_are_usable() -> TestResult {
    let h = harness();
    let out = run(
        &h,
        r#"
        let path = require("path");
        let qs = require("querystring");
        let json = require("json");
        msg.base = path.basename("/srv/data/report.csv");
        msg.ext = path.extname("/srv/data/report.csv");
        msg.query = qs.parse("a=1&b=two%20words");
        msg.encoded = json.stringify({ k: [1, 2] });
        msg.decoded = json.parse("{\"n\": 5}").n;
        msg.platform = require("os").platform();
        "#,
        json!({}),
    )?;

    assert_eq!(out["base"], "report.csv");
    assert_eq!(out["ext"], ".csv");
    assert_eq!(out["query"], json!({ "a": "1", "b": "two words" }));
    assert_eq!(out["encoded"], "{\"k\":[1,2]}");
    assert_eq!(out["decoded"], 5);
    assert_eq!(out["platform"], std::env::consts::OS);
    Ok(())
}

#[test]
fn host_capabilities_reach_store_env_and_status() -> TestResult {
    let h = harness();
    h.store.set(StoreTier::Flow, "seen", json!(4));

    let out = run(
        &h,
        r#"
        context.set("last", msg.payload);
        context.flow.set("seen", context.flow.get("seen") + 1);
        context.global.set("gone", null);
        msg.region = env.get("REGION");
        msg.missing = env.get("NOPE");
        msg.node = node.name;
        node.status({ fill: "yellow", text: "checking" });
        node.log("processed", msg.payload);
        "#,
        json!({ "payload": "p1" }),
    )?;

    assert_eq!(out["region"], "eu-west");
    assert_eq!(out["missing"], Value::Null);
    assert_eq!(out["node"], "script-node");
    assert_eq!(h.store.get(StoreTier::Local, "last"), Some(json!("p1")));
    assert_eq!(h.store.get(StoreTier::Flow, "seen"), Some(json!(5)));
    assert_eq!(h.status.last(), Some(Status::new(StatusFill::Yellow, "checking")));
    Ok(())
}

#[test]
fn read_only_bindings_are_visible_but_immutable() -> TestResult {
    let h = harness();
    let script = Script::compile("msg.from = original_msg.topic; msg.field = result_field; msg.cmd = config.command;")?;
    let bindings = Bindings {
        msg: json!({}),
        original_msg: Some(json!({ "topic": "t" })),
        result_field: Some("payload".to_string()),
        config: json!({ "command": "ls" }),
    };
    let out = interp::execute(script.program(), &h.sandbox, bindings, Duration::from_millis(500))?;
    assert_eq!(out, json!({ "from": "t", "field": "payload", "cmd": "ls" }));

    let script = Script::compile("original_msg.topic = 1;")?;
    let bindings = Bindings {
        original_msg: Some(json!({ "topic": "t" })),
        ..Bindings::default()
    };
    let err = interp::execute(script.program(), &h.sandbox, bindings, Duration::from_millis(500));
    assert!(matches!(err, Err(ScriptError::Runtime(m)) if m.contains("read-only")));
    Ok(())
}

// ---------------------------------------------------------------------------
// Scripts inside the invocation pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pre_script_null_drops_the_event_without_spawning() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo")
        .pre_script("if msg.skip { msg = null; }")
        .build();
    let t = TestEngine::new(cfg);

    let outcome = with_timeout(t.engine.invoke(json!({ "skip": true, "payload": "x" }))).await?;

    assert!(matches!(outcome, InvocationOutcome::Dropped));
    assert!(t.sink.is_empty());
    assert!(t.engine.process_table().is_empty());
    assert_eq!(t.status.last(), Some(Status::cleared()));
    Ok(())
}

#[tokio::test]
async fn pre_script_rewrites_arguments_but_messages_copy_the_original() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo")
        .pre_script("msg.payload = msg.payload.upper(); msg.added = 1;")
        .build();
    let t = TestEngine::new(cfg);

    with_timeout(t.engine.invoke(json!({ "payload": "quiet words", "topic": "a" }))).await?;

    let control = &t.sink.lane(Lane::Control)[0];
    assert_eq!(control["payload"]["stdout"], "QUIET WORDS\n");
    assert_eq!(control["topic"], "a");
    assert!(control.get("added").is_none());
    Ok(())
}

#[tokio::test]
async fn pre_script_non_object_is_an_error() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("echo").pre_script("msg = 5;").build());

    let result = with_timeout(t.engine.invoke(json!({}))).await;

    assert!(matches!(
        result,
        Err(ExecError::ScriptRuntime { stage: ScriptStage::Pre, .. })
    ));
    assert!(t.sink.is_empty());
    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Red, "pre-script error")));
    Ok(())
}

#[tokio::test]
async fn post_script_reshapes_the_control_result() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo")
        .post_script(
            r#"
            let r = msg[result_field];
            msg[result_field] = { lines: r.stdout.trim().split(" "), ok: r.rc == 0 };
            msg.source = original_msg.topic;
            "#,
        )
        .build();
    let t = TestEngine::new(cfg);

    with_timeout(t.engine.invoke(json!({ "payload": "x y", "topic": "jobs" }))).await?;

    let control = &t.sink.lane(Lane::Control)[0];
    assert_eq!(control["payload"], json!({ "lines": ["x", "y"], "ok": true }));
    assert_eq!(control["source"], "jobs");
    // Stdout chunks are not post-processed.
    assert_eq!(t.sink.stdout_text("payload"), "x y\n");
    Ok(())
}

#[tokio::test]
async fn post_script_null_suppresses_only_the_control_message() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("sh").post_script("msg = null;").build();
    let t = TestEngine::new(cfg);

    with_timeout(t.engine.invoke(json!({ "payload": ["-c", "echo out; echo err >&2"] }))).await?;

    assert!(t.sink.lane(Lane::Control).is_empty());
    assert_eq!(t.sink.lane_field(Lane::Stderr, "payload"), vec![json!("err\n")]);
    assert_eq!(t.sink.stdout_text("payload"), "out\n");
    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Green, "done (0)")));
    Ok(())
}

#[tokio::test]
async fn post_script_non_object_reverts_to_the_original_result() -> TestResult {
    init_tracing();
    let t = TestEngine::new(NodeConfigBuilder::new("echo").post_script("msg = \"nope\";").build());

    with_timeout(t.engine.invoke(json!({ "payload": "hi" }))).await?;

    let control = t.sink.lane(Lane::Control);
    assert_eq!(control.len(), 1);
    assert_eq!(control[0]["payload"]["state"], "end");
    assert_eq!(control[0]["payload"]["stdout"], "hi\n");
    Ok(())
}

#[tokio::test]
async fn post_script_failure_emits_neither_stderr_nor_control() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("sh").post_script("msg.x = nothing.here;").build();
    let t = TestEngine::new(cfg);

    let result = with_timeout(t.engine.invoke(json!({ "payload": ["-c", "echo out; echo err >&2"] }))).await;

    assert!(matches!(
        result,
        Err(ExecError::ScriptRuntime { stage: ScriptStage::Post, .. })
    ));
    assert!(t.sink.lane(Lane::Stderr).is_empty());
    assert!(t.sink.lane(Lane::Control).is_empty());
    // Streamed chunks were already delivered.
    assert_eq!(t.sink.stdout_text("payload"), "out\n");
    assert_eq!(t.status.last(), Some(Status::new(StatusFill::Red, "post-script error")));
    Ok(())
}

#[tokio::test]
async fn script_timeout_fails_the_invocation() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo")
        .pre_script("while true { msg.n = 1; }")
        .script_timeout_ms(50)
        .build();
    let t = TestEngine::new(cfg);

    let result = with_timeout(t.engine.invoke(json!({}))).await;

    match result {
        Err(ExecError::ScriptTimeout { stage, timeout }) => {
            assert_eq!(stage, ScriptStage::Pre);
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected a script timeout, got {other:?}"),
    }
    assert!(t.sink.is_empty());
    Ok(())
}

#[tokio::test]
async fn denied_capability_fails_the_invocation() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo")
        .pre_script("let cp = require(\"child_process\");")
        .build();
    let t = TestEngine::new(cfg);

    let result = with_timeout(t.engine.invoke(json!({}))).await;

    assert!(matches!(
        result,
        Err(ExecError::CapabilityDenied { stage: ScriptStage::Pre, ref capability }) if capability == "child_process"
    ));
    assert!(t.sink.is_empty());
    Ok(())
}

#[tokio::test]
async fn scripts_share_the_engine_store_and_env() -> TestResult {
    init_tracing();
    let cfg = NodeConfigBuilder::new("echo")
        .arguments_source("args")
        .pre_script(
            r#"
            let n = context.get("runs");
            if n == null { n = 0; }
            context.set("runs", n + 1);
            msg.args = [env.get("GREETING"), str(n + 1)];
            "#,
        )
        .build();
    let t = TestEngine::with_env(cfg, StaticEnv::new().with("GREETING", "hello"));

    with_timeout(t.engine.invoke(json!({}))).await?;
    with_timeout(t.engine.invoke(json!({}))).await?;

    let stdout: Vec<Value> = t
        .sink
        .lane(Lane::Control)
        .iter()
        .map(|m| m["payload"]["stdout"].clone())
        .collect();
    assert_eq!(stdout, vec![json!("hello 1\n"), json!("hello 2\n")]);
    assert_eq!(t.store.get(StoreTier::Local, "runs"), Some(json!(2)));
    Ok(())
}
