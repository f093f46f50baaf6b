// src/script/interp.rs

//! Tree-walking evaluator for transform scripts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use super::parser::{BinaryOp, Expr, LogicalOp, Program, Stmt, StmtKind, UnaryOp};
use super::sandbox::{self, Capability, Member, Sandbox};
use super::value::{display, loose_eq, number, truthy};
use super::ScriptError;
use crate::message::{self, Segment};

/// Upper bound for any string a script builds.
const MAX_STRING_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound for the element count of any array a script builds.
const MAX_ARRAY_LEN: usize = 1 << 20;

/// Upper bound for the approximate footprint of any value a script builds.
const MAX_VALUE_BYTES: usize = 64 * 1024 * 1024;

/// Nesting limit for arrays and objects a script builds.
const MAX_DEPTH: usize = 128;

/// Footprint charged per JSON node on top of its string contents.
const NODE_BYTES: usize = 16;

/// Variables that scripts may read but never reassign or mutate.
const READ_ONLY: &[&str] = &["original_msg", "result_field", "config"];

const BUILTINS: &[&str] = &["len", "str", "num", "keys", "has", "require"];

/// Values bound into a script execution.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    /// The working value; its final state is the script's result.
    pub msg: Value,
    /// Post-processing only: the event as it was before pre-processing.
    pub original_msg: Option<Value>,
    /// Post-processing only: name of the field holding the result.
    pub result_field: Option<String>,
    /// Read-only view of the node configuration.
    pub config: Value,
}

/// Run `program` to completion and return the final `msg`.
pub fn execute(
    program: &Program,
    sandbox: &Sandbox,
    bindings: Bindings,
    timeout: Duration,
) -> Result<Value, ScriptError> {
    let mut vars = HashMap::new();
    vars.insert("msg".to_string(), Val::Json(bindings.msg));
    vars.insert("config".to_string(), Val::Json(bindings.config));
    if let Some(original) = bindings.original_msg {
        vars.insert("original_msg".to_string(), Val::Json(original));
    }
    if let Some(field) = bindings.result_field {
        vars.insert("result_field".to_string(), Val::Json(Value::String(field)));
    }

    let mut interp = Interpreter {
        sandbox,
        vars,
        deadline: Instant::now() + timeout,
        timeout,
    };
    interp.block(&program.stmts)?;

    match interp.vars.remove("msg") {
        Some(Val::Json(msg)) => Ok(msg),
        Some(Val::Cap(_)) => Err(ScriptError::Runtime(
            "msg must be a plain value, not a host object".to_string(),
        )),
        None => Ok(Value::Null),
    }
}

enum Flow {
    Next,
    Return,
}

#[derive(Clone)]
enum Val {
    Json(Value),
    Cap(Capability),
}

struct Interpreter<'a> {
    sandbox: &'a Sandbox,
    vars: HashMap<String, Val>,
    deadline: Instant,
    timeout: Duration,
}

impl Interpreter<'_> {
    fn tick(&self) -> Result<(), ScriptError> {
        if Instant::now() >= self.deadline {
            return Err(ScriptError::Timeout(self.timeout));
        }
        Ok(())
    }

    fn block(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            self.tick()?;
            if let Flow::Return = self.statement(stmt)? {
                return Ok(Flow::Return);
            }
        }
        Ok(Flow::Next)
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        let at_line = |e: ScriptError| match e {
            ScriptError::Runtime(m) if !m.starts_with("line ") => {
                ScriptError::Runtime(format!("line {}: {m}", stmt.line))
            }
            other => other,
        };

        match &stmt.kind {
            StmtKind::Let { name, value } => {
                if self.is_reserved(name) {
                    return Err(at_line(ScriptError::Runtime(format!(
                        "cannot declare '{name}': the name is reserved"
                    ))));
                }
                let value = self.eval(value).map_err(at_line)?;
                self.vars.insert(name.clone(), value);
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value).map_err(at_line)?;
                self.assign(target, value).map_err(at_line)?;
            }
            StmtKind::Delete(target) => self.delete(target).map_err(at_line)?,
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval_json(cond).map_err(at_line)?;
                if truthy(&cond) {
                    return self.block(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.block(else_branch);
                }
            }
            StmtKind::While { cond, body } => loop {
                self.tick()?;
                let c = self.eval_json(cond).map_err(at_line)?;
                if !truthy(&c) {
                    break;
                }
                if let Flow::Return = self.block(body)? {
                    return Ok(Flow::Return);
                }
            },
            StmtKind::Return => return Ok(Flow::Return),
            StmtKind::Expr(expr) => {
                self.eval(expr).map_err(at_line)?;
            }
        }
        Ok(Flow::Next)
    }

    fn is_reserved(&self, name: &str) -> bool {
        name == "msg"
            || READ_ONLY.contains(&name)
            || BUILTINS.contains(&name)
            || Capability::root(name).is_some()
    }

    /// Resolve an assignment target to its root variable and path.
    fn place(&mut self, expr: &Expr) -> Result<(String, Vec<Segment>), ScriptError> {
        match expr {
            Expr::Ident(name) => Ok((name.clone(), Vec::new())),
            Expr::Member { target, name } => {
                let (root, mut path) = self.place(target)?;
                path.push(Segment::Key(name.clone()));
                Ok((root, path))
            }
            Expr::Index { target, index } => {
                let (root, mut path) = self.place(target)?;
                let index = self.eval_json(index)?;
                path.push(index_segment(&index)?);
                Ok((root, path))
            }
            _ => Err(ScriptError::Runtime("invalid assignment target".to_string())),
        }
    }

    fn writable_root(&mut self, root: &str) -> Result<&mut Val, ScriptError> {
        if READ_ONLY.contains(&root) {
            return Err(ScriptError::Runtime(format!("'{root}' is read-only")));
        }
        if Capability::root(root).is_some() {
            return Err(ScriptError::Runtime(format!("'{root}' cannot be modified")));
        }
        self.vars.get_mut(root).ok_or_else(|| {
            ScriptError::Runtime(format!("'{root}' is not defined (declare it with let)"))
        })
    }

    fn assign(&mut self, target: &Expr, value: Val) -> Result<(), ScriptError> {
        let (root, path) = self.place(target)?;
        let slot = self.writable_root(&root)?;
        if path.is_empty() {
            *slot = value;
            return Ok(());
        }
        let (Val::Json(slot), Val::Json(value)) = (slot, value) else {
            return Err(ScriptError::Runtime(
                "host objects cannot be stored in or modified as values".to_string(),
            ));
        };
        check_size(&value)?;
        message::set_in(slot, &path, value).map_err(ScriptError::Runtime)?;
        check_size(slot)
    }

    fn delete(&mut self, target: &Expr) -> Result<(), ScriptError> {
        let (root, path) = self.place(target)?;
        if path.is_empty() {
            return Err(ScriptError::Runtime(format!(
                "cannot delete variable '{root}'; assign null instead"
            )));
        }
        if let Val::Json(slot) = self.writable_root(&root)? {
            message::remove_in(slot, &path);
        }
        Ok(())
    }

    fn eval_json(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match self.eval(expr)? {
            Val::Json(v) => Ok(v),
            Val::Cap(_) => Err(ScriptError::Runtime(
                "host objects cannot be stored or compared".to_string(),
            )),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Val, ScriptError> {
        match expr {
            Expr::Literal(v) => Ok(Val::Json(v.clone())),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval_json(e))
                    .collect::<Result<Vec<_>, _>>()?;
                let array = Value::Array(values);
                check_size(&array)?;
                Ok(Val::Json(array))
            }
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (k, e) in fields {
                    map.insert(k.clone(), self.eval_json(e)?);
                }
                let object = Value::Object(map);
                check_size(&object)?;
                Ok(Val::Json(object))
            }
            Expr::Ident(name) => {
                if let Some(v) = self.vars.get(name) {
                    Ok(v.clone())
                } else if let Some(cap) = Capability::root(name) {
                    Ok(Val::Cap(cap))
                } else {
                    Err(ScriptError::Runtime(format!("'{name}' is not defined")))
                }
            }
            Expr::Member { target, name } => match self.eval(target)? {
                Val::Cap(cap) => match self.sandbox.member(cap, name)? {
                    Member::Value(v) => Ok(Val::Json(v)),
                    Member::Capability(c) => Ok(Val::Cap(c)),
                },
                Val::Json(v) => member(&v, name).map(Val::Json),
            },
            Expr::Index { target, index } => {
                let target = self.eval_json(target)?;
                let index = self.eval_json(index)?;
                index_value(&target, &index).map(Val::Json)
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Unary { op, operand } => {
                let v = self.eval_json(operand)?;
                match op {
                    UnaryOp::Not => Ok(Val::Json(Value::Bool(!truthy(&v)))),
                    UnaryOp::Neg => match v.as_f64() {
                        Some(n) => Ok(Val::Json(number(-n))),
                        None => Err(ScriptError::Runtime(format!(
                            "cannot negate a {}",
                            message::type_name(&v)
                        ))),
                    },
                }
            }
            Expr::Binary { left, op, right } => {
                let l = self.eval_json(left)?;
                let r = self.eval_json(right)?;
                binary(*op, l, r).map(Val::Json)
            }
            Expr::Logical { left, op, right } => {
                let l = self.eval_json(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !truthy(&l),
                    LogicalOp::Or => truthy(&l),
                };
                if short_circuit {
                    Ok(Val::Json(l))
                } else {
                    self.eval_json(right).map(Val::Json)
                }
            }
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Val, ScriptError> {
        let args = args
            .iter()
            .map(|a| self.eval_json(a))
            .collect::<Result<Vec<_>, _>>()?;

        match callee {
            Expr::Ident(name) if name == "require" && !self.vars.contains_key(name) => {
                let module = sandbox::string_arg(&args, 0, "require")?;
                sandbox::require(module).map(|m| Val::Cap(Capability::Module(m)))
            }
            Expr::Ident(name) if !self.vars.contains_key(name) => builtin(name, &args).map(Val::Json),
            Expr::Member { target, name } => match self.eval(target)? {
                Val::Cap(cap) => self.sandbox.call(cap, name, &args).map(Val::Json),
                Val::Json(receiver) => method(&receiver, name, &args).map(Val::Json),
            },
            _ => Err(ScriptError::Runtime("expression is not callable".to_string())),
        }
    }
}

fn index_segment(index: &Value) -> Result<Segment, ScriptError> {
    match index {
        Value::String(s) => Ok(Segment::Key(s.clone())),
        Value::Number(n) => n
            .as_u64()
            .map(|i| Segment::Index(i as usize))
            .ok_or_else(|| ScriptError::Runtime(format!("invalid index {n}"))),
        other => Err(ScriptError::Runtime(format!(
            "cannot use a {} as an index",
            message::type_name(other)
        ))),
    }
}

fn member(target: &Value, name: &str) -> Result<Value, ScriptError> {
    match target {
        Value::Null => Err(ScriptError::Runtime(format!(
            "cannot read property '{name}' of null"
        ))),
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if name == "length" => Ok(number(items.len() as f64)),
        Value::String(s) if name == "length" => Ok(number(s.chars().count() as f64)),
        _ => Ok(Value::Null),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, ScriptError> {
    if target.is_null() {
        return Err(ScriptError::Runtime(format!(
            "cannot index null with {}",
            display(index)
        )));
    }
    let seg = index_segment(index)?;
    Ok(message::get_in(target, std::slice::from_ref(&seg))
        .cloned()
        .unwrap_or(Value::Null))
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, ScriptError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(loose_eq(&l, &r))),
        BinaryOp::Ne => return Ok(Value::Bool(!loose_eq(&l, &r))),
        BinaryOp::Add => return add(l, r),
        _ => {}
    }

    if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
        return match op {
            BinaryOp::Sub => Ok(number(a - b)),
            BinaryOp::Mul => Ok(number(a * b)),
            BinaryOp::Div | BinaryOp::Rem if b == 0.0 => {
                Err(ScriptError::Runtime("division by zero".to_string()))
            }
            BinaryOp::Div => Ok(number(a / b)),
            BinaryOp::Rem => Ok(number(a % b)),
            BinaryOp::Lt => Ok(Value::Bool(a < b)),
            BinaryOp::Le => Ok(Value::Bool(a <= b)),
            BinaryOp::Gt => Ok(Value::Bool(a > b)),
            BinaryOp::Ge => Ok(Value::Bool(a >= b)),
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Add => unreachable!("handled above"),
        };
    }

    if let (Value::String(a), Value::String(b)) = (&l, &r) {
        match op {
            BinaryOp::Lt => return Ok(Value::Bool(a < b)),
            BinaryOp::Le => return Ok(Value::Bool(a <= b)),
            BinaryOp::Gt => return Ok(Value::Bool(a > b)),
            BinaryOp::Ge => return Ok(Value::Bool(a >= b)),
            _ => {}
        }
    }

    Err(ScriptError::Runtime(format!(
        "unsupported operands for {op:?}: {} and {}",
        message::type_name(&l),
        message::type_name(&r)
    )))
}

fn add(l: Value, r: Value) -> Result<Value, ScriptError> {
    match (l, r) {
        (Value::Array(mut a), Value::Array(b)) => {
            if a.len().saturating_add(b.len()) > MAX_ARRAY_LEN {
                return Err(too_large("array"));
            }
            a.extend(b);
            let joined = Value::Array(a);
            check_size(&joined)?;
            Ok(joined)
        }
        (l, r) if l.is_string() || r.is_string() => {
            let joined = display(&l) + &display(&r);
            if joined.len() > MAX_STRING_BYTES {
                return Err(too_large("string"));
            }
            Ok(Value::String(joined))
        }
        (l, r) => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => Ok(number(a + b)),
            _ => Err(ScriptError::Runtime(format!(
                "cannot add {} and {}",
                message::type_name(&l),
                message::type_name(&r)
            ))),
        },
    }
}

/// Reject values that exceed the string, array, footprint or nesting limits.
fn check_size(value: &Value) -> Result<(), ScriptError> {
    let mut budget = MAX_VALUE_BYTES;
    weigh(value, 0, &mut budget)
}

fn weigh(value: &Value, depth: usize, budget: &mut usize) -> Result<(), ScriptError> {
    if depth > MAX_DEPTH {
        return Err(ScriptError::Runtime("value nested too deeply".to_string()));
    }
    let cost = match value {
        Value::String(s) if s.len() > MAX_STRING_BYTES => return Err(too_large("string")),
        Value::String(s) => NODE_BYTES + s.len(),
        Value::Array(items) if items.len() > MAX_ARRAY_LEN => return Err(too_large("array")),
        _ => NODE_BYTES,
    };
    charge(budget, cost)?;

    match value {
        Value::Array(items) => items.iter().try_for_each(|v| weigh(v, depth + 1, budget)),
        Value::Object(map) => map.iter().try_for_each(|(k, v)| {
            charge(budget, k.len())?;
            weigh(v, depth + 1, budget)
        }),
        _ => Ok(()),
    }
}

fn charge(budget: &mut usize, cost: usize) -> Result<(), ScriptError> {
    *budget = budget.checked_sub(cost).ok_or_else(|| too_large("value"))?;
    Ok(())
}

fn too_large(what: &str) -> ScriptError {
    ScriptError::Runtime(format!("{what} too large"))
}

fn builtin(name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let first = args.first().unwrap_or(&Value::Null);
    match name {
        "len" => length(first),
        "str" => Ok(Value::String(display(first))),
        "num" => Ok(match first {
            Value::Number(_) => first.clone(),
            Value::String(s) => s.trim().parse::<f64>().map(number).unwrap_or(Value::Null),
            Value::Bool(b) => number(if *b { 1.0 } else { 0.0 }),
            _ => Value::Null,
        }),
        "keys" => match first {
            Value::Object(map) => Ok(Value::Array(
                map.keys().cloned().map(Value::String).collect(),
            )),
            other => Err(ScriptError::Runtime(format!(
                "keys() expects an object, got a {}",
                message::type_name(other)
            ))),
        },
        "has" => {
            let key = sandbox::string_arg(args, 1, "has")?;
            Ok(Value::Bool(
                first.as_object().is_some_and(|m| m.contains_key(key)),
            ))
        }
        other => Err(ScriptError::Runtime(format!("'{other}' is not a function"))),
    }
}

fn length(value: &Value) -> Result<Value, ScriptError> {
    match value {
        Value::String(s) => Ok(number(s.chars().count() as f64)),
        Value::Array(a) => Ok(number(a.len() as f64)),
        Value::Object(m) => Ok(number(m.len() as f64)),
        other => Err(ScriptError::Runtime(format!(
            "len() expects a string, array or object, got a {}",
            message::type_name(other)
        ))),
    }
}

fn method(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    if name == "len" {
        return length(receiver);
    }

    match receiver {
        Value::String(s) => string_method(s, name, args),
        Value::Array(items) => match name {
            "join" => {
                let sep = args.first().and_then(Value::as_str).unwrap_or(",");
                let mut joined = String::new();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        joined.push_str(sep);
                    }
                    joined.push_str(&display(item));
                    if joined.len() > MAX_STRING_BYTES {
                        return Err(too_large("string"));
                    }
                }
                Ok(Value::String(joined))
            }
            "contains" => {
                let needle = args.first().unwrap_or(&Value::Null);
                Ok(Value::Bool(items.iter().any(|v| loose_eq(v, needle))))
            }
            _ => Err(no_method("array", name)),
        },
        other => Err(no_method(message::type_name(other), name)),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let arg = |i: usize| sandbox::string_arg(args, i, name);
    match name {
        "trim" => Ok(Value::String(s.trim().to_string())),
        "upper" => Ok(Value::String(s.to_uppercase())),
        "lower" => Ok(Value::String(s.to_lowercase())),
        "split" => {
            let sep = arg(0)?;
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep).map(|p| Value::String(p.to_string())).collect()
            };
            if parts.len() > MAX_ARRAY_LEN {
                return Err(too_large("array"));
            }
            Ok(Value::Array(parts))
        }
        "contains" => Ok(Value::Bool(s.contains(arg(0)?))),
        "starts_with" => Ok(Value::Bool(s.starts_with(arg(0)?))),
        "ends_with" => Ok(Value::Bool(s.ends_with(arg(0)?))),
        "replace" => {
            let replaced = s.replace(arg(0)?, arg(1)?);
            if replaced.len() > MAX_STRING_BYTES {
                return Err(too_large("string"));
            }
            Ok(Value::String(replaced))
        }
        _ => Err(no_method("string", name)),
    }
}

fn no_method(kind: &str, name: &str) -> ScriptError {
    ScriptError::Runtime(format!("{kind} has no method '{name}'"))
}
