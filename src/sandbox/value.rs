/*!
 * Script Values
 * Dynamic values shared between compiled code and the host
 */

use super::ast::FunctionDecl;
use super::env::Env;
use super::interpreter::Interpreter;
use super::types::{RuntimeError, RuntimeResult};
use parking_lot::RwLock;
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// JSON conversion stops descending past this depth (cyclic objects)
const MAX_JSON_DEPTH: usize = 64;

/// Host function callable from scripts
pub type NativeFn = dyn Fn(&Interpreter, Vec<Value>) -> RuntimeResult<Value> + Send + Sync;

pub struct NativeFunction {
    pub name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn call(&self, interp: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
        (self.func)(interp, args)
    }
}

/// Script function with its captured scope
pub struct Closure {
    pub decl: Arc<FunctionDecl>,
    pub env: Arc<Env>,
}

impl Closure {
    /// Same declaration over the same scope
    pub fn same(&self, other: &Closure) -> bool {
        Arc::ptr_eq(&self.decl, &other.decl) && Arc::ptr_eq(&self.env, &other.env)
    }
}

/// Mutable field map that can be frozen once
#[derive(Default)]
pub struct ObjectCell {
    fields: RwLock<BTreeMap<String, Value>>,
    frozen: AtomicBool,
}

impl ObjectCell {
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self {
            fields: RwLock::new(fields),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.fields.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.read().contains_key(key)
    }

    /// Write a field; frozen objects reject every write
    pub fn set(&self, key: impl Into<String>, value: Value) -> RuntimeResult<()> {
        let key = key.into();
        if self.is_frozen() {
            return Err(RuntimeError::Frozen(key));
        }
        self.fields.write().insert(key, value);
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.fields.read().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.fields
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.read().is_empty()
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    /// Arrays are immutable; updates build a new array
    Array(Arc<Vec<Value>>),
    Object(Arc<ObjectCell>),
    Function(Arc<Closure>),
    Native(Arc<NativeFunction>),
    /// Stand-in for the host global object
    Guard,
}

/// Render a number the way scripts print it
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(items))
    }

    pub fn object(fields: BTreeMap<String, Value>) -> Value {
        Value::Object(Arc::new(ObjectCell::new(fields)))
    }

    pub fn empty_object() -> Value {
        Value::object(BTreeMap::new())
    }

    /// Build an object from `(key, value)` pairs
    pub fn object_from<I, K>(pairs: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn native<F>(name: impl Into<String>, func: F) -> Value
    where
        F: Fn(&Interpreter, Vec<Value>) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Value::Native(Arc::new(NativeFunction {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) | Value::Guard => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Text used for concatenation and `String(x)`
    pub fn to_display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.to_string(),
            Value::Array(items) => items
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Guard => "[object Object]".to_string(),
            Value::Function(_) | Value::Native(_) => "[function]".to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<ObjectCell>> {
        match self {
            Value::Object(cell) => Some(cell),
            _ => None,
        }
    }

    /// Field of an object, `Null` for anything else
    pub fn field(&self, key: &str) -> Value {
        self.as_object()
            .and_then(|cell| cell.get(key))
            .unwrap_or(Value::Null)
    }

    /// Equality used by `==`: by value for primitives, by identity otherwise
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.same(b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Guard, Value::Guard) => true,
            _ => false,
        }
    }

    /// Freeze this value and everything reachable through objects and arrays
    pub fn deep_freeze(&self) {
        self.deep_freeze_at(0);
    }

    fn deep_freeze_at(&self, depth: usize) {
        if depth > MAX_JSON_DEPTH {
            return;
        }
        match self {
            Value::Object(cell) => {
                if cell.is_frozen() {
                    return;
                }
                cell.freeze();
                for (_, v) in cell.entries() {
                    v.deep_freeze_at(depth + 1);
                }
            }
            Value::Array(items) => items.iter().for_each(|v| v.deep_freeze_at(depth + 1)),
            _ => {}
        }
    }

    /// Snapshot as JSON; functions become `"[function]"`
    pub fn to_json(&self) -> Json {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> Json {
        if depth > MAX_JSON_DEPTH {
            return Json::Null;
        }
        match self {
            Value::Null | Value::Guard => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Json::from(*n as i64)
                } else {
                    Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null)
                }
            }
            Value::Str(s) => Json::String(s.to_string()),
            Value::Array(items) => {
                Json::Array(items.iter().map(|v| v.to_json_at(depth + 1)).collect())
            }
            Value::Object(cell) => {
                let mut map = Map::new();
                for (k, v) in cell.entries() {
                    map.insert(k, v.to_json_at(depth + 1));
                }
                Json::Object(map)
            }
            Value::Function(_) | Value::Native(_) => Json::String("[function]".into()),
        }
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::str(s),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        Value::from_json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Function(c) => write!(
                f,
                "Function({})",
                c.decl.name.as_deref().unwrap_or("anonymous")
            ),
            Value::Native(n) => write!(f, "Native({})", n.name),
            Value::Guard => write!(f, "Guard"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}
