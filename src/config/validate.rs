// src/config/validate.rs

use std::time::Duration;

use tracing::warn;

use crate::config::model::{NodeConfig, RawNodeConfig, Thresholds};
use crate::errors::{ExecError, Result};
use crate::message::PropertyPath;
use crate::script::Script;

impl TryFrom<RawNodeConfig> for NodeConfig {
    type Error = ExecError;

    fn try_from(raw: RawNodeConfig) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;

        let arguments_source = parse_path("arguments_source", &raw.arguments_source)?;
        let result_field = parse_path("result_field", &raw.result_field)?;
        let env_source = non_empty(raw.env_source.as_deref())
            .map(|p| parse_path("env_source", p))
            .transpose()?;

        let pre_script = compile_script("scripts.pre", raw.scripts.pre.as_deref())?;
        let post_script = compile_script("scripts.post", raw.scripts.post.as_deref())?;

        if raw.command.trim().is_empty() {
            warn!(node = %raw.name, "no command configured; every trigger will fail");
        }

        Ok(NodeConfig {
            name: raw.name,
            command: raw.command.trim().to_string(),
            args: raw.args,
            arguments_source,
            env_source,
            cwd: non_empty(raw.cwd.as_deref()).map(str::to_string),
            input: raw.input,
            result_field,
            send_start_control: raw.send_start_control,
            thresholds: Thresholds {
                error: raw.thresholds.error,
                warning: raw.thresholds.warning,
            },
            pre_script,
            post_script,
            script_timeout: Duration::from_millis(raw.scripts.timeout_ms),
            shutdown_grace: Duration::from_millis(raw.shutdown.grace_ms),
        })
    }
}

/// Check cross-field invariants of a raw config.
pub fn validate_config(cfg: &RawNodeConfig) -> Result<()> {
    validate_thresholds(cfg)?;
    validate_timeouts(cfg)?;
    Ok(())
}

fn validate_thresholds(cfg: &RawNodeConfig) -> Result<()> {
    if let Some(warning) = cfg.thresholds.warning {
        if warning >= cfg.thresholds.error {
            return Err(ExecError::Configuration(format!(
                "[thresholds].warning ({warning}) must be below [thresholds].error ({})",
                cfg.thresholds.error
            )));
        }
    }
    Ok(())
}

fn validate_timeouts(cfg: &RawNodeConfig) -> Result<()> {
    if cfg.scripts.timeout_ms == 0 {
        return Err(ExecError::Configuration(
            "[scripts].timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn parse_path(field: &str, raw: &str) -> Result<PropertyPath> {
    raw.parse::<PropertyPath>()
        .map_err(|e| ExecError::Configuration(format!("invalid `{field}`: {e}")))
}

fn compile_script(field: &str, source: Option<&str>) -> Result<Option<Script>> {
    non_empty(source)
        .map(|src| {
            Script::compile(src)
                .map_err(|e| ExecError::Configuration(format!("invalid `{field}`: {e}")))
        })
        .transpose()
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}
