// src/script/sandbox.rs

//! The capability set visible to scripts.
//!
//! Scripts cannot reach the host except through the objects defined here:
//! `node` (logging and status), `context` (key/value store tiers), `env`
//! (read-only variable lookup) and modules obtained from `require`, which
//! consults a fixed allow-list.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use super::modules::Module;
use super::value::display;
use super::ScriptError;
use crate::host::{ContextStore, EnvLookup, StatusReporter, StoreTier};
use crate::types::{Status, StatusFill};

/// Name → module table consulted by `require`. Anything not listed here is
/// denied.
const ALLOWED_MODULES: &[(&str, Module)] = &[
    ("os", Module::Os),
    ("path", Module::Path),
    ("json", Module::Json),
    ("querystring", Module::QueryString),
];

/// Resolve a `require(name)` call against the allow-list.
pub fn require(name: &str) -> Result<Module, ScriptError> {
    ALLOWED_MODULES
        .iter()
        .find(|(allowed, _)| *allowed == name)
        .map(|(_, module)| *module)
        .ok_or_else(|| ScriptError::CapabilityDenied(name.to_string()))
}

/// A host object reachable from script code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Node,
    Store(StoreTier),
    Env,
    Module(Module),
}

impl Capability {
    /// Capability bound to a root identifier, if any.
    pub fn root(name: &str) -> Option<Self> {
        match name {
            "node" => Some(Capability::Node),
            "context" => Some(Capability::Store(StoreTier::Local)),
            "env" => Some(Capability::Env),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Capability::Node => "node".to_string(),
            Capability::Store(StoreTier::Local) => "context".to_string(),
            Capability::Store(tier) => format!("context.{tier}"),
            Capability::Env => "env".to_string(),
            Capability::Module(m) => format!("module '{}'", m.name()),
        }
    }
}

/// Result of reading a property of a capability.
pub enum Member {
    Value(Value),
    Capability(Capability),
}

/// Host services shared by every script execution of one engine.
#[derive(Clone)]
pub struct Sandbox {
    node_name: Arc<str>,
    status: Arc<dyn StatusReporter>,
    store: Arc<dyn ContextStore>,
    env: Arc<dyn EnvLookup>,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("node_name", &self.node_name)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    pub fn new(
        node_name: impl Into<Arc<str>>,
        status: Arc<dyn StatusReporter>,
        store: Arc<dyn ContextStore>,
        env: Arc<dyn EnvLookup>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            status,
            store,
            env,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn member(&self, cap: Capability, name: &str) -> Result<Member, ScriptError> {
        match (cap, name) {
            (Capability::Node, "name") | (Capability::Node, "id") => {
                Ok(Member::Value(Value::String(self.node_name.to_string())))
            }
            (Capability::Store(StoreTier::Local), "flow") => {
                Ok(Member::Capability(Capability::Store(StoreTier::Flow)))
            }
            (Capability::Store(StoreTier::Local), "global") => {
                Ok(Member::Capability(Capability::Store(StoreTier::Global)))
            }
            (cap, name) => Err(ScriptError::Runtime(format!(
                "{} has no property '{name}'",
                cap.describe()
            ))),
        }
    }

    pub fn call(&self, cap: Capability, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
        match cap {
            Capability::Node => self.call_node(method, args),
            Capability::Store(tier) => self.call_store(tier, method, args),
            Capability::Env => match method {
                "get" => {
                    let name = string_arg(args, 0, "env.get")?;
                    Ok(self.env.get(name).map(Value::String).unwrap_or(Value::Null))
                }
                _ => Err(no_method(&cap, method)),
            },
            Capability::Module(module) => module.call(method, args),
        }
    }

    fn call_node(&self, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let text = || args.iter().map(display).collect::<Vec<_>>().join(" ");
        match method {
            "log" => info!(target: "execlane::script", node = %self.node_name, "{}", text()),
            "warn" => warn!(target: "execlane::script", node = %self.node_name, "{}", text()),
            "error" => error!(target: "execlane::script", node = %self.node_name, "{}", text()),
            "status" => self.status.update(status_from_args(args)?),
            _ => return Err(no_method(&Capability::Node, method)),
        }
        Ok(Value::Null)
    }

    fn call_store(&self, tier: StoreTier, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
        match method {
            "get" => {
                let key = string_arg(args, 0, "context.get")?;
                Ok(self.store.get(tier, key).unwrap_or(Value::Null))
            }
            "set" => {
                let key = string_arg(args, 0, "context.set")?;
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                self.store.set(tier, key, value);
                Ok(Value::Null)
            }
            "keys" => Ok(Value::Array(
                self.store.keys(tier).into_iter().map(Value::String).collect(),
            )),
            _ => Err(no_method(&Capability::Store(tier), method)),
        }
    }
}

/// `node.status({fill, text})`, `node.status(fill, text)` or `node.status({})`.
fn status_from_args(args: &[Value]) -> Result<Status, ScriptError> {
    let (fill, text) = match args {
        [] => (None, None),
        [Value::Object(obj)] => (
            obj.get("fill").and_then(Value::as_str),
            obj.get("text").map(display),
        ),
        [Value::String(fill), rest @ ..] => (Some(fill.as_str()), rest.first().map(display)),
        _ => {
            return Err(ScriptError::Runtime(
                "node.status expects an object or (fill, text)".to_string(),
            ));
        }
    };

    match fill {
        None if text.as_deref().is_none_or(str::is_empty) => Ok(Status::cleared()),
        None => Ok(Status::new(StatusFill::Grey, text.unwrap_or_default())),
        Some(fill) => {
            let fill = fill.parse::<StatusFill>().map_err(ScriptError::Runtime)?;
            Ok(Status::new(fill, text.unwrap_or_default()))
        }
    }
}

fn no_method(cap: &Capability, method: &str) -> ScriptError {
    ScriptError::Runtime(format!("{} has no method '{method}'", cap.describe()))
}

pub(crate) fn string_arg<'a>(
    args: &'a [Value],
    idx: usize,
    func: &str,
) -> Result<&'a str, ScriptError> {
    args.get(idx).and_then(Value::as_str).ok_or_else(|| {
        ScriptError::Runtime(format!("{func} expects a string as argument {}", idx + 1))
    })
}
