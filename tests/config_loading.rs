// tests/config_loading.rs

mod common;
use crate::common::{NodeConfigBuilder, TestResult};

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;

use execlane::config::{load_and_validate, load_from_path, NodeConfig};
use execlane::errors::ExecError;
use execlane::types::InputMode;

fn write_config(contents: &str) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn full_config_round_trips_into_a_node_config() -> TestResult {
    let file = write_config(
        r#"
        name = "lister"
        command = "ls"
        args = "-l"
        arguments_source = "req.args"
        env_source = "req.env"
        cwd = "/srv/${req.dir}"
        input = "pipe"
        result_field = "result"
        send_start_control = true

        [thresholds]
        error = 10
        warning = 3

        [scripts]
        pre = "msg.req.args = [\"-a\"];"
        post = "msg.done = true;"
        timeout_ms = 250

        [shutdown]
        grace_ms = 500
        "#,
    )?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.name, "lister");
    assert_eq!(cfg.command, "ls");
    assert_eq!(cfg.args, "-l");
    assert_eq!(cfg.arguments_source.to_string(), "req.args");
    assert_eq!(cfg.env_source.as_ref().map(|p| p.to_string()), Some("req.env".to_string()));
    assert_eq!(cfg.cwd.as_deref(), Some("/srv/${req.dir}"));
    assert_eq!(cfg.input, InputMode::Pipe);
    assert_eq!(cfg.result_field.to_string(), "result");
    assert!(cfg.send_start_control);
    assert_eq!(cfg.thresholds.error, 10);
    assert_eq!(cfg.thresholds.warning, Some(3));
    assert!(cfg.pre_script.is_some());
    assert!(cfg.post_script.is_some());
    assert_eq!(cfg.script_timeout, Duration::from_millis(250));
    assert_eq!(cfg.shutdown_grace, Duration::from_millis(500));
    Ok(())
}

#[test]
fn minimal_config_uses_defaults() -> TestResult {
    let file = write_config("command = \"date\"\n")?;
    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.command, "date");
    assert_eq!(cfg.args, "");
    assert_eq!(cfg.arguments_source.to_string(), "payload");
    assert_eq!(cfg.result_field.to_string(), "payload");
    assert!(cfg.env_source.is_none());
    assert!(cfg.cwd.is_none());
    assert_eq!(cfg.input, InputMode::Argument);
    assert!(!cfg.send_start_control);
    assert_eq!(cfg.thresholds.error, 1);
    assert_eq!(cfg.thresholds.warning, None);
    assert!(cfg.pre_script.is_none());
    assert_eq!(cfg.script_timeout, Duration::from_millis(1000));
    assert_eq!(cfg.shutdown_grace, Duration::from_millis(2000));
    Ok(())
}

#[test]
fn blank_optional_fields_count_as_absent() -> TestResult {
    let file = write_config("command = \"date\"\nenv_source = \" \"\ncwd = \"\"\n[scripts]\npre = \"  \"\n")?;
    let cfg = load_and_validate(file.path())?;
    assert!(cfg.env_source.is_none());
    assert!(cfg.cwd.is_none());
    assert!(cfg.pre_script.is_none());
    Ok(())
}

#[test]
fn missing_command_is_accepted_at_load_time() -> TestResult {
    let file = write_config("name = \"idle\"\n")?;
    let cfg = load_and_validate(file.path())?;
    assert!(cfg.command.is_empty());
    Ok(())
}

#[test]
fn view_exposed_to_scripts_reflects_the_config() {
    let cfg = NodeConfigBuilder::new("echo").warning_threshold(0).error_threshold(4).build();
    let view = cfg.to_json();
    assert_eq!(view["command"], "echo");
    assert_eq!(view["thresholds"]["warning"], 0);
    assert_eq!(view["thresholds"]["error"], 4);
    assert_eq!(view["input"], "argument");
}

fn assert_config_error(raw: execlane::config::RawNodeConfig, needle: &str) {
    match NodeConfig::try_from(raw) {
        Err(ExecError::Configuration(message)) => {
            assert!(message.contains(needle), "'{message}' does not mention '{needle}'")
        }
        other => panic!("expected a configuration error mentioning '{needle}', got {other:?}"),
    }
}

#[test]
fn warning_threshold_must_be_below_error_threshold() {
    let raw = NodeConfigBuilder::new("echo").warning_threshold(5).error_threshold(5).raw();
    assert_config_error(raw, "[thresholds].warning");
}

#[test]
fn zero_script_timeout_is_rejected() {
    let raw = NodeConfigBuilder::new("echo").script_timeout_ms(0).raw();
    assert_config_error(raw, "timeout_ms");
}

#[test]
fn script_syntax_errors_fail_validation() {
    let raw = NodeConfigBuilder::new("echo").post_script("msg.x = (1 + ;").raw();
    assert_config_error(raw, "scripts.post");
}

#[test]
fn malformed_property_paths_fail_validation() {
    assert_config_error(NodeConfigBuilder::new("echo").arguments_source("a..b").raw(), "arguments_source");
    assert_config_error(NodeConfigBuilder::new("echo").result_field("").raw(), "result_field");
    assert_config_error(NodeConfigBuilder::new("echo").env_source("x[").raw(), "env_source");
}

#[test]
fn unknown_input_mode_is_a_toml_error() -> TestResult {
    let file = write_config("command = \"cat\"\ninput = \"socket\"\n")?;
    assert!(matches!(load_from_path(file.path()), Err(ExecError::Toml(_))));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let path = PathBuf::from("/nonexistent/execlane/Execlane.toml");
    assert!(matches!(load_and_validate(path), Err(ExecError::Io(_))));
}
