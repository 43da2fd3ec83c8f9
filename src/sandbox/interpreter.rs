/*!
 * Tree-Walking Interpreter
 * Evaluates parsed programs against a scope chain
 */

use super::ast::*;
use super::env::Env;
use super::globals::{array_method, string_method};
use super::types::{Cancellation, RuntimeError, RuntimeResult, MAX_CALL_DEPTH};
use super::value::{Closure, Value};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Names on the global object that compiled code may never reach
pub const BLOCKED_GLOBALS: [&str; 2] = ["fetch", "XMLHttpRequest"];

/// Names that resolve back to the guarded global object
pub const GLOBAL_ALIASES: [&str; 3] = ["window", "self", "globalThis"];

enum Flow {
    Normal,
    Return(Value),
}

/// Evaluation state for one call tree
///
/// The ambient scope answers property reads on the guarded global object.
/// Every call and loop iteration polls the cancellation flag.
pub struct Interpreter {
    depth: Cell<usize>,
    ambient: Option<Arc<Env>>,
    cancel: Cancellation,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            depth: Cell::new(0),
            ambient: None,
            cancel: Cancellation::new(),
        }
    }

    pub fn with_ambient(ambient: Arc<Env>) -> Self {
        Self {
            depth: Cell::new(0),
            ambient: Some(ambient),
            cancel: Cancellation::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run a program's top level; `export` statements write into `exports`
    pub fn run_program(
        &self,
        program: &Program,
        env: &Arc<Env>,
        exports: &Value,
    ) -> RuntimeResult<()> {
        self.exec_block(&program.body, env, Some(exports)).map(|_| ())
    }

    /// Call any callable value
    pub fn call(&self, callee: &Value, args: Vec<Value>) -> RuntimeResult<Value> {
        match callee {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Native(native) => {
                self.enter()?;
                let result = native.call(self, args);
                self.leave();
                result
            }
            other => Err(RuntimeError::Type(format!(
                "{} is not a function",
                other.type_name()
            ))),
        }
    }

    fn enter(&self) -> RuntimeResult<()> {
        self.cancel.check()?;
        let depth = self.depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::CallDepth);
        }
        self.depth.set(depth + 1);
        Ok(())
    }

    fn leave(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }

    fn call_closure(&self, closure: &Arc<Closure>, args: Vec<Value>) -> RuntimeResult<Value> {
        self.enter()?;
        let env = Env::child(&closure.env);
        if let Some(name) = &closure.decl.name {
            env.define(name.clone(), Value::Function(Arc::clone(closure)));
        }
        let mut args = args.into_iter();
        for param in &closure.decl.params {
            env.define(param.clone(), args.next().unwrap_or(Value::Null));
        }
        let result = self.exec_block(&closure.decl.body, &env, None);
        self.leave();
        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Null),
        }
    }

    fn exec_block(
        &self,
        stmts: &[Stmt],
        env: &Arc<Env>,
        exports: Option<&Value>,
    ) -> RuntimeResult<Flow> {
        // Function declarations are visible to the whole block
        for stmt in stmts {
            if let Stmt::Function(decl) = stmt {
                if let Some(name) = &decl.name {
                    env.define(name.clone(), self.closure(decl, env));
                }
            }
        }
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt, env, exports)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn closure(&self, decl: &Arc<FunctionDecl>, env: &Arc<Env>) -> Value {
        Value::Function(Arc::new(Closure {
            decl: Arc::clone(decl),
            env: Arc::clone(env),
        }))
    }

    fn export(&self, exports: Option<&Value>, name: &str, value: Value) -> RuntimeResult<()> {
        match exports.and_then(Value::as_object) {
            Some(cell) => cell.set(name, value),
            None => Err(RuntimeError::Type(
                "export is only valid at module level".into(),
            )),
        }
    }

    fn exec(&self, stmt: &Stmt, env: &Arc<Env>, exports: Option<&Value>) -> RuntimeResult<Flow> {
        match stmt {
            Stmt::Let(name, value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Null,
                };
                env.define(name.clone(), value);
            }
            Stmt::Function(_) => {}
            Stmt::Export(name, expr) => {
                let value = self.eval(expr, env)?;
                env.define(name.clone(), value.clone());
                self.export(exports, name, value)?;
            }
            Stmt::ExportDefault(expr) => {
                let value = self.eval(expr, env)?;
                self.export(exports, "default", value)?;
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If(cond, then, otherwise) => {
                if self.eval(cond, env)?.truthy() {
                    return self.exec_block(then, &Env::child(env), None);
                }
                if let Some(otherwise) = otherwise {
                    return self.exec_block(otherwise, &Env::child(env), None);
                }
            }
            Stmt::For(binding, iterable, body) => {
                let items: Vec<Value> = match self.eval(iterable, env)? {
                    Value::Array(items) => items.as_ref().clone(),
                    Value::Object(cell) => cell.keys().into_iter().map(Value::str).collect(),
                    Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
                    Value::Null => Vec::new(),
                    other => {
                        return Err(RuntimeError::Type(format!(
                            "{} is not iterable",
                            other.type_name()
                        )))
                    }
                };
                for item in items {
                    self.cancel.check()?;
                    let scope = Env::child(env);
                    scope.define(binding.clone(), item);
                    if let Flow::Return(value) = self.exec_block(body, &scope, None)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::Block(body) => return self.exec_block(body, &Env::child(env), None),
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
            }
        }
        Ok(Flow::Normal)
    }

    pub fn eval(&self, expr: &Expr, env: &Arc<Env>) -> RuntimeResult<Value> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(Arc::clone(s))),
            Expr::Ident(name, _) => env
                .get(name)
                .ok_or_else(|| RuntimeError::Reference(name.clone())),
            Expr::Array(elements) => Ok(Value::array(self.elements(elements, env)?)),
            Expr::Object(props) => self.object(props, env),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                Ok(binary(*op, &lhs, &rhs))
            }
            Expr::Logical(op, lhs, rhs) => {
                let lhs = self.eval(lhs, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !lhs.truthy(),
                    LogicalOp::Or => lhs.truthy(),
                    LogicalOp::Nullish => !lhs.is_null(),
                };
                if short_circuit {
                    Ok(lhs)
                } else {
                    self.eval(rhs, env)
                }
            }
            Expr::Conditional(cond, then, otherwise) => {
                if self.eval(cond, env)?.truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let object = self.eval(object, env)?;
                if *optional && object.is_null() {
                    return Ok(Value::Null);
                }
                self.member(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                self.index(&object, &index)
            }
            Expr::Call { callee, args, .. } => {
                let target = self.eval(callee, env)?;
                let args = self.elements(args, env)?;
                if !target.is_callable() {
                    return Err(RuntimeError::Type(format!(
                        "{} is not a function",
                        describe(callee)
                    )));
                }
                self.call(&target, args)
            }
            Expr::Function(decl) => Ok(self.closure(decl, env)),
            Expr::Assign(target, value) => {
                let value = self.eval(value, env)?;
                self.assign(target, value.clone(), env)?;
                Ok(value)
            }
        }
    }

    fn elements(&self, elements: &[Element], env: &Arc<Env>) -> RuntimeResult<Vec<Value>> {
        let mut out = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Element::Item(expr) => out.push(self.eval(expr, env)?),
                Element::Spread(expr) => match self.eval(expr, env)? {
                    Value::Array(items) => out.extend(items.iter().cloned()),
                    Value::Str(s) => out.extend(s.chars().map(|c| Value::str(c.to_string()))),
                    other => {
                        return Err(RuntimeError::Type(format!(
                            "cannot spread {} into a list",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(out)
    }

    fn object(&self, props: &[Property], env: &Arc<Env>) -> RuntimeResult<Value> {
        let mut fields = BTreeMap::new();
        for prop in props {
            match prop {
                Property::Field(key, expr) => {
                    fields.insert(key.clone(), self.eval(expr, env)?);
                }
                Property::Computed(key, expr) => {
                    let key = self.eval(key, env)?.to_display();
                    fields.insert(key, self.eval(expr, env)?);
                }
                Property::Spread(expr) => match self.eval(expr, env)? {
                    Value::Object(cell) => fields.extend(cell.entries()),
                    Value::Array(items) => {
                        for (i, item) in items.iter().enumerate() {
                            fields.insert(i.to_string(), item.clone());
                        }
                    }
                    Value::Null => {}
                    other => {
                        return Err(RuntimeError::Type(format!(
                            "cannot spread {} into an object",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(Value::object(fields))
    }

    /// Property read, including the guarded global object
    pub fn member(&self, object: &Value, key: &str) -> RuntimeResult<Value> {
        match object {
            Value::Object(cell) => Ok(cell.get(key).unwrap_or(Value::Null)),
            Value::Guard => {
                if BLOCKED_GLOBALS.contains(&key) {
                    return Err(RuntimeError::SecurityViolation(format!(
                        "access to global '{}' is blocked; use the injected sdk.API.fetch",
                        key
                    )));
                }
                if GLOBAL_ALIASES.contains(&key) {
                    return Ok(Value::Guard);
                }
                Ok(self
                    .ambient
                    .as_ref()
                    .and_then(|env| env.get(key))
                    .unwrap_or(Value::Null))
            }
            Value::Array(items) => Ok(array_method(items, key).unwrap_or(Value::Null)),
            Value::Str(s) => Ok(string_method(s, key).unwrap_or(Value::Null)),
            Value::Null => Err(RuntimeError::Type(format!(
                "cannot read property '{}' of null",
                key
            ))),
            _ => Ok(Value::Null),
        }
    }

    fn index(&self, object: &Value, index: &Value) -> RuntimeResult<Value> {
        match (object, index) {
            (Value::Array(items), Value::Number(n)) => {
                Ok(usize_index(*n).and_then(|i| items.get(i).cloned()).unwrap_or(Value::Null))
            }
            (Value::Str(s), Value::Number(n)) => Ok(usize_index(*n)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::str(c.to_string()))
                .unwrap_or(Value::Null)),
            (object, index) => self.member(object, &index.to_display()),
        }
    }

    fn assign(&self, target: &Expr, value: Value, env: &Arc<Env>) -> RuntimeResult<()> {
        match target {
            Expr::Ident(name, _) => env.assign(name, value),
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval(object, env)?;
                self.set_property(&object, property, value)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let key = self.eval(index, env)?.to_display();
                self.set_property(&object, &key, value)
            }
            _ => Err(RuntimeError::Type("invalid assignment target".into())),
        }
    }

    fn set_property(&self, object: &Value, key: &str, value: Value) -> RuntimeResult<()> {
        match object {
            Value::Object(cell) => cell.set(key, value),
            Value::Guard if BLOCKED_GLOBALS.contains(&key) => Err(
                RuntimeError::SecurityViolation(format!("cannot replace global '{}'", key)),
            ),
            Value::Guard => Err(RuntimeError::Type(
                "the global object is read-only".into(),
            )),
            Value::Array(_) => Err(RuntimeError::Type(
                "arrays are immutable; build a new one with spread".into(),
            )),
            other => Err(RuntimeError::Type(format!(
                "cannot set property '{}' on {}",
                key,
                other.type_name()
            ))),
        }
    }
}

fn usize_index(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 {
        Some(n as usize)
    } else {
        None
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name, _) => name.clone(),
        Expr::Member { property, .. } => property.clone(),
        _ => "expression".to_string(),
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Value::str(format!("{}{}", lhs.to_display(), rhs.to_display()))
            }
            _ => Value::Number(lhs.to_number() + rhs.to_number()),
        },
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Eq => Value::Bool(lhs.strict_eq(rhs)),
        BinaryOp::NotEq => Value::Bool(!lhs.strict_eq(rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => lhs.to_number().partial_cmp(&rhs.to_number()),
            };
            let result = match ordering {
                Some(ord) => match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Le => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                },
                None => false,
            };
            Value::Bool(result)
        }
    }
}
