// src/message.rs

//! Property paths into trigger events.
//!
//! Events are plain `serde_json::Value` objects. Configuration refers to
//! fields inside them with dotted paths such as `payload`, `req.args[0]` or
//! `headers["x-env"]`; this module parses those paths and reads, writes and
//! removes the values they point at.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

/// One step of a property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed, non-empty property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    segments: Vec<Segment>,
}

impl PropertyPath {
    pub fn new(segments: Vec<Segment>) -> Result<Self, String> {
        if segments.is_empty() {
            return Err("property path is empty".to_string());
        }
        Ok(Self { segments })
    }

    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        get_in(root, &self.segments)
    }

    /// Write `value` at this path, replacing whatever is in the way.
    pub fn put(&self, root: &mut Value, value: Value) {
        put_in(root, &self.segments, value)
    }
}

impl FromStr for PropertyPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = parse_segments(s)?;
        PropertyPath::new(segments)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) if is_plain_ident(k) => write!(f, ".{k}")?,
                Segment::Key(k) => write!(f, "[{k:?}]")?,
                Segment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

fn is_plain_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn parse_segments(input: &str) -> Result<Vec<Segment>, String> {
    let input = input.trim();
    let mut segments = Vec::new();
    let mut chars = input.chars().peekable();
    let mut expect_key = true;

    while let Some(&ch) = chars.peek() {
        match ch {
            '.' => {
                if expect_key {
                    return Err(format!("unexpected '.' in property path '{input}'"));
                }
                chars.next();
                expect_key = true;
            }
            '[' => {
                chars.next();
                let seg = match chars.peek() {
                    Some(&q) if q == '"' || q == '\'' => {
                        chars.next();
                        let mut key = String::new();
                        loop {
                            match chars.next() {
                                Some(c) if c == q => break,
                                Some(c) => key.push(c),
                                None => {
                                    return Err(format!(
                                        "unterminated quoted key in property path '{input}'"
                                    ));
                                }
                            }
                        }
                        Segment::Key(key)
                    }
                    _ => {
                        let mut digits = String::new();
                        while let Some(&c) = chars.peek() {
                            if c == ']' {
                                break;
                            }
                            digits.push(c);
                            chars.next();
                        }
                        let idx = digits.trim().parse::<usize>().map_err(|_| {
                            format!("invalid index '{digits}' in property path '{input}'")
                        })?;
                        Segment::Index(idx)
                    }
                };
                if chars.next() != Some(']') {
                    return Err(format!("missing ']' in property path '{input}'"));
                }
                segments.push(seg);
                expect_key = false;
            }
            _ => {
                if !expect_key {
                    return Err(format!("unexpected '{ch}' in property path '{input}'"));
                }
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    if c.is_whitespace() {
                        return Err(format!("whitespace in property path '{input}'"));
                    }
                    key.push(c);
                    chars.next();
                }
                segments.push(Segment::Key(key));
                expect_key = false;
            }
        }
    }

    if expect_key {
        return Err(format!("property path '{input}' is incomplete"));
    }
    Ok(segments)
}

/// Read the value at `segments`; `None` when any step is missing.
pub fn get_in<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |cur, seg| match (seg, cur) {
        (Segment::Key(k), Value::Object(map)) => map.get(k),
        (Segment::Index(i), Value::Array(items)) => items.get(*i),
        (Segment::Key(k), Value::Array(items)) => k.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `value` at `segments`, creating intermediate containers on the way.
pub fn set_in(root: &mut Value, segments: &[Segment], value: Value) -> Result<(), String> {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut cur = root;
    for (i, seg) in parents.iter().enumerate() {
        let next_is_index = matches!(segments[i + 1], Segment::Index(_));
        cur = child_mut(cur, seg, next_is_index)?;
    }

    match (last, cur) {
        (Segment::Key(k), Value::Object(map)) => {
            map.insert(k.clone(), value);
            Ok(())
        }
        (Segment::Index(i), Value::Array(items)) => {
            if *i < items.len() {
                items[*i] = value;
                Ok(())
            } else if *i == items.len() {
                items.push(value);
                Ok(())
            } else {
                Err(format!("index {i} out of bounds (length {})", items.len()))
            }
        }
        (seg, other) => Err(format!(
            "cannot set {} on a {}",
            describe_segment(seg),
            type_name(other)
        )),
    }
}

fn child_mut<'a>(
    cur: &'a mut Value,
    seg: &Segment,
    create_array: bool,
) -> Result<&'a mut Value, String> {
    let fresh = || {
        if create_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        }
    };

    match seg {
        Segment::Key(k) => match cur {
            Value::Object(map) => {
                let slot = map.entry(k.clone()).or_insert_with(fresh);
                if slot.is_null() {
                    *slot = fresh();
                }
                Ok(slot)
            }
            other => Err(format!("cannot read property '{k}' of a {}", type_name(other))),
        },
        Segment::Index(i) => match cur {
            Value::Array(items) => {
                if *i == items.len() {
                    items.push(fresh());
                }
                let len = items.len();
                items
                    .get_mut(*i)
                    .ok_or_else(|| format!("index {i} out of bounds (length {len})"))
            }
            other => Err(format!("cannot index a {} with [{i}]", type_name(other))),
        },
    }
}

/// Like [`set_in`], but never fails: scalar or mismatched intermediates are
/// replaced by the container the next segment needs, and arrays are padded
/// with nulls up to the target index.
pub fn put_in(root: &mut Value, segments: &[Segment], value: Value) {
    let mut cur = root;
    for seg in segments {
        cur = match seg {
            Segment::Key(k) => {
                if !cur.is_object() {
                    *cur = Value::Object(Map::new());
                }
                &mut cur[k.as_str()]
            }
            Segment::Index(i) => {
                match &mut *cur {
                    Value::Array(items) if items.len() > *i => {}
                    Value::Array(items) => items.resize(*i + 1, Value::Null),
                    other => *other = Value::Array(vec![Value::Null; *i + 1]),
                }
                &mut cur[*i]
            }
        };
    }
    *cur = value;
}

/// Remove and return the value at `segments`.
pub fn remove_in(root: &mut Value, segments: &[Segment]) -> Option<Value> {
    let (last, parents) = segments.split_last()?;
    let mut cur = root;
    for seg in parents {
        cur = match (seg, cur) {
            (Segment::Key(k), Value::Object(map)) => map.get_mut(k)?,
            (Segment::Index(i), Value::Array(items)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    match (last, cur) {
        (Segment::Key(k), Value::Object(map)) => map.remove(k),
        (Segment::Index(i), Value::Array(items)) if *i < items.len() => Some(items.remove(*i)),
        _ => None,
    }
}

fn describe_segment(seg: &Segment) -> String {
    match seg {
        Segment::Key(k) => format!("property '{k}'"),
        Segment::Index(i) => format!("index [{i}]"),
    }
}

/// JSON type name used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a value as a command-line or environment string.
///
/// Strings are used verbatim; every other value becomes its compact JSON
/// text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
