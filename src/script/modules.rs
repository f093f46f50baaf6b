// src/script/modules.rs

//! Auxiliary modules available through `require`.
//!
//! All of them are pure functions over their arguments; none touches the
//! filesystem, the network or other processes.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::sandbox::string_arg;
use super::value::display;
use super::ScriptError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Os,
    Path,
    Json,
    QueryString,
}

impl Module {
    pub fn name(&self) -> &'static str {
        match self {
            Module::Os => "os",
            Module::Path => "path",
            Module::Json => "json",
            Module::QueryString => "querystring",
        }
    }

    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
        match self {
            Module::Os => os(method),
            Module::Path => path(method, args),
            Module::Json => json(method, args),
            Module::QueryString => querystring(method, args),
        }
        .unwrap_or_else(|| {
            Err(ScriptError::Runtime(format!(
                "module '{}' has no function '{method}'",
                self.name()
            )))
        })
    }
}

fn os(method: &str) -> Option<Result<Value, ScriptError>> {
    let value = match method {
        "platform" => std::env::consts::OS.to_string(),
        "arch" => std::env::consts::ARCH.to_string(),
        "eol" => (if cfg!(windows) { "\r\n" } else { "\n" }).to_string(),
        "tmpdir" => std::env::temp_dir().to_string_lossy().into_owned(),
        _ => return None,
    };
    Some(Ok(Value::String(value)))
}

fn path(method: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    let result = match method {
        "join" => join_paths(args),
        "basename" => string_arg(args, 0, "path.basename").map(|p| {
            Value::String(
                Path::new(p)
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        }),
        "dirname" => string_arg(args, 0, "path.dirname").map(|p| {
            let parent = Path::new(p)
                .parent()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Value::String(if parent.is_empty() { ".".to_string() } else { parent })
        }),
        "extname" => string_arg(args, 0, "path.extname").map(|p| {
            Value::String(
                Path::new(p)
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default(),
            )
        }),
        "is_absolute" => {
            string_arg(args, 0, "path.is_absolute").map(|p| Value::Bool(Path::new(p).is_absolute()))
        }
        _ => return None,
    };
    Some(result)
}

fn join_paths(args: &[Value]) -> Result<Value, ScriptError> {
    let mut joined = PathBuf::new();
    for (i, _) in args.iter().enumerate() {
        joined.push(string_arg(args, i, "path.join")?);
    }
    Ok(Value::String(joined.to_string_lossy().into_owned()))
}

fn json(method: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    let result = match method {
        "parse" => string_arg(args, 0, "json.parse").and_then(|text| {
            serde_json::from_str(text)
                .map_err(|e| ScriptError::Runtime(format!("json.parse: {e}")))
        }),
        "stringify" => {
            let value = args.first().cloned().unwrap_or(Value::Null);
            let pretty = args.get(1).is_some_and(|v| v.as_bool() == Some(true));
            let text = if pretty {
                serde_json::to_string_pretty(&value)
            } else {
                serde_json::to_string(&value)
            };
            text.map(Value::String)
                .map_err(|e| ScriptError::Runtime(format!("json.stringify: {e}")))
        }
        _ => return None,
    };
    Some(result)
}

fn querystring(method: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    let result = match method {
        "parse" => string_arg(args, 0, "querystring.parse").map(|text| {
            let text = text.strip_prefix('?').unwrap_or(text);
            let mut map = Map::new();
            for (k, v) in url::form_urlencoded::parse(text.as_bytes()) {
                map.insert(k.into_owned(), Value::String(v.into_owned()));
            }
            Value::Object(map)
        }),
        "stringify" => match args.first() {
            Some(Value::Object(map)) => {
                let mut ser = url::form_urlencoded::Serializer::new(String::new());
                for (k, v) in map {
                    ser.append_pair(k, &display(v));
                }
                Ok(Value::String(ser.finish()))
            }
            _ => Err(ScriptError::Runtime(
                "querystring.stringify expects an object".to_string(),
            )),
        },
        _ => return None,
    };
    Some(result)
}
