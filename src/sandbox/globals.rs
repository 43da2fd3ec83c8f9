/*!
 * Ambient Scope
 * Builtins visible to every compiled unit, with network names shadowed
 */

use super::env::Env;
use super::interpreter::Interpreter;
use super::types::{RuntimeError, RuntimeResult};
use super::value::Value;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

fn callback(args: &[Value], method: &str) -> RuntimeResult<Value> {
    let f = arg(args, 0);
    if !f.is_callable() {
        return Err(RuntimeError::Type(format!(
            "{} expects a function",
            method
        )));
    }
    Ok(f)
}

/// Clamp a relative `slice` bound into `0..=len`
fn bound(value: &Value, len: usize, default: usize) -> usize {
    if value.is_null() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc() as i64;
    let len = len as i64;
    let at = if n < 0 { (len + n).max(0) } else { n.min(len) };
    at as usize
}

/// Bound method of an array value
pub(crate) fn array_method(items: &Arc<Vec<Value>>, name: &str) -> Option<Value> {
    let items = Arc::clone(items);
    let method = match name {
        "length" => return Some(Value::Number(items.len() as f64)),
        "map" => Value::native("map", move |interp, args| {
            let f = callback(&args, "map")?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(interp.call(&f, vec![item.clone(), Value::Number(i as f64)])?);
            }
            Ok(Value::array(out))
        }),
        "filter" => Value::native("filter", move |interp, args| {
            let f = callback(&args, "filter")?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if interp
                    .call(&f, vec![item.clone(), Value::Number(i as f64)])?
                    .truthy()
                {
                    out.push(item.clone());
                }
            }
            Ok(Value::array(out))
        }),
        "find" => Value::native("find", move |interp, args| {
            let f = callback(&args, "find")?;
            for item in items.iter() {
                if interp.call(&f, vec![item.clone()])?.truthy() {
                    return Ok(item.clone());
                }
            }
            Ok(Value::Null)
        }),
        "some" => Value::native("some", move |interp, args| {
            let f = callback(&args, "some")?;
            for item in items.iter() {
                if interp.call(&f, vec![item.clone()])?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }),
        "every" => Value::native("every", move |interp, args| {
            let f = callback(&args, "every")?;
            for item in items.iter() {
                if !interp.call(&f, vec![item.clone()])?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        "reduce" => Value::native("reduce", move |interp, args| {
            let f = callback(&args, "reduce")?;
            let mut acc = arg(&args, 1);
            for item in items.iter() {
                acc = interp.call(&f, vec![acc, item.clone()])?;
            }
            Ok(acc)
        }),
        "includes" => Value::native("includes", move |_, args| {
            let needle = arg(&args, 0);
            Ok(Value::Bool(items.iter().any(|v| v.strict_eq(&needle))))
        }),
        "indexOf" => Value::native("indexOf", move |_, args| {
            let needle = arg(&args, 0);
            let at = items.iter().position(|v| v.strict_eq(&needle));
            Ok(Value::Number(at.map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "join" => Value::native("join", move |_, args| {
            let sep = match arg(&args, 0) {
                Value::Null => ",".to_string(),
                other => other.to_display(),
            };
            let parts: Vec<String> = items.iter().map(Value::to_display).collect();
            Ok(Value::str(parts.join(&sep)))
        }),
        "concat" => Value::native("concat", move |_, args| {
            let mut out = items.as_ref().clone();
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }),
        "slice" => Value::native("slice", move |_, args| {
            let start = bound(&arg(&args, 0), items.len(), 0);
            let end = bound(&arg(&args, 1), items.len(), items.len());
            let out = if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            };
            Ok(Value::array(out))
        }),
        _ => return None,
    };
    Some(method)
}

/// Bound method of a string value
pub(crate) fn string_method(s: &Arc<str>, name: &str) -> Option<Value> {
    let s = Arc::clone(s);
    let method = match name {
        "length" => return Some(Value::Number(s.chars().count() as f64)),
        "toUpperCase" => Value::native("toUpperCase", move |_, _| Ok(Value::str(s.to_uppercase()))),
        "toLowerCase" => Value::native("toLowerCase", move |_, _| Ok(Value::str(s.to_lowercase()))),
        "trim" => Value::native("trim", move |_, _| Ok(Value::str(s.trim()))),
        "includes" => Value::native("includes", move |_, args| {
            Ok(Value::Bool(s.contains(arg(&args, 0).to_display().as_str())))
        }),
        "startsWith" => Value::native("startsWith", move |_, args| {
            Ok(Value::Bool(s.starts_with(arg(&args, 0).to_display().as_str())))
        }),
        "endsWith" => Value::native("endsWith", move |_, args| {
            Ok(Value::Bool(s.ends_with(arg(&args, 0).to_display().as_str())))
        }),
        "split" => Value::native("split", move |_, args| {
            let sep = arg(&args, 0).to_display();
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::str(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::str).collect()
            };
            Ok(Value::array(parts))
        }),
        "replace" => Value::native("replace", move |_, args| {
            let from = arg(&args, 0).to_display();
            let to = arg(&args, 1).to_display();
            Ok(Value::str(s.replacen(from.as_str(), &to, 1)))
        }),
        "slice" => Value::native("slice", move |_, args| {
            let chars: Vec<char> = s.chars().collect();
            let start = bound(&arg(&args, 0), chars.len(), 0);
            let end = bound(&arg(&args, 1), chars.len(), chars.len());
            let out: String = if start < end {
                chars[start..end].iter().collect()
            } else {
                String::new()
            };
            Ok(Value::str(out))
        }),
        _ => return None,
    };
    Some(method)
}

fn math() -> Value {
    fn unary(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
        (
            name,
            Value::native(name, move |_, args| Ok(Value::Number(f(arg(&args, 0).to_number())))),
        )
    }
    let fold = |name: &'static str, init: f64, pick: fn(f64, f64) -> f64| {
        (
            name,
            Value::native(name, move |_, args| {
                Ok(Value::Number(
                    args.iter().map(Value::to_number).fold(init, pick),
                ))
            }),
        )
    };
    let math = Value::object_from([
        unary("floor", f64::floor),
        unary("ceil", f64::ceil),
        unary("round", f64::round),
        unary("abs", f64::abs),
        unary("sqrt", f64::sqrt),
        unary("trunc", f64::trunc),
        fold("min", f64::INFINITY, f64::min),
        fold("max", f64::NEG_INFINITY, f64::max),
        (
            "pow",
            Value::native("pow", |_, args| {
                Ok(Value::Number(
                    arg(&args, 0).to_number().powf(arg(&args, 1).to_number()),
                ))
            }),
        ),
        (
            "random",
            Value::native("random", |_, _| {
                Ok(Value::Number(rand::thread_rng().gen::<f64>()))
            }),
        ),
        ("PI", Value::Number(std::f64::consts::PI)),
    ]);
    math.deep_freeze();
    math
}

fn json() -> Value {
    let json = Value::object_from([
        (
            "stringify",
            Value::native("stringify", |_, args| {
                let value = arg(&args, 0).to_json();
                let pretty = !arg(&args, 2).is_null();
                let text = if pretty {
                    serde_json::to_string_pretty(&value)
                } else {
                    serde_json::to_string(&value)
                };
                text.map(Value::str)
                    .map_err(|e| RuntimeError::Type(e.to_string()))
            }),
        ),
        (
            "parse",
            Value::native("parse", |_, args| {
                let text = arg(&args, 0).to_display();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(|v| Value::from_json(&v))
                    .map_err(|e| RuntimeError::Thrown(format!("JSON.parse: {}", e)))
            }),
        ),
    ]);
    json.deep_freeze();
    json
}

fn console() -> Value {
    let line = |args: &[Value]| {
        args.iter()
            .map(Value::to_display)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let console = Value::object_from([
        (
            "log",
            Value::native("log", move |_, args| {
                debug!(target: "sandbox::console", "{}", line(&args));
                Ok(Value::Null)
            }),
        ),
        (
            "warn",
            Value::native("warn", move |_, args| {
                warn!(target: "sandbox::console", "{}", line(&args));
                Ok(Value::Null)
            }),
        ),
        (
            "error",
            Value::native("error", move |_, args| {
                tracing::error!(target: "sandbox::console", "{}", line(&args));
                Ok(Value::Null)
            }),
        ),
    ]);
    console.deep_freeze();
    console
}

fn object_helpers() -> Value {
    let helpers = Value::object_from([
        (
            "keys",
            Value::native("keys", |_, args| {
                Ok(match arg(&args, 0) {
                    Value::Object(cell) => Value::array(cell.keys().into_iter().map(Value::str).collect()),
                    _ => Value::array(Vec::new()),
                })
            }),
        ),
        (
            "values",
            Value::native("values", |_, args| {
                Ok(match arg(&args, 0) {
                    Value::Object(cell) => {
                        Value::array(cell.entries().into_iter().map(|(_, v)| v).collect())
                    }
                    _ => Value::array(Vec::new()),
                })
            }),
        ),
        (
            "entries",
            Value::native("entries", |_, args| {
                Ok(match arg(&args, 0) {
                    Value::Object(cell) => Value::array(
                        cell.entries()
                            .into_iter()
                            .map(|(k, v)| Value::array(vec![Value::str(k), v]))
                            .collect(),
                    ),
                    _ => Value::array(Vec::new()),
                })
            }),
        ),
        (
            "freeze",
            Value::native("freeze", |_, args| {
                let target = arg(&args, 0);
                if let Some(cell) = target.as_object() {
                    cell.freeze();
                }
                Ok(target)
            }),
        ),
    ]);
    helpers.deep_freeze();
    helpers
}

/// Root scope for compiled code
///
/// `window`, `self` and `globalThis` resolve to the guard, bare `fetch`
/// resolves to the injected one when present, and `XMLHttpRequest` raises.
pub fn ambient_scope(injected_fetch: Option<Value>) -> Arc<Env> {
    let env = Env::root();
    for alias in super::interpreter::GLOBAL_ALIASES {
        env.define(alias, Value::Guard);
    }
    let fetch = injected_fetch.filter(Value::is_callable).unwrap_or_else(|| {
        Value::native("fetch", |_, _| {
            Err(RuntimeError::SecurityViolation(
                "network access is blocked: no secure fetch provider".into(),
            ))
        })
    });
    env.define("fetch", fetch);
    env.define(
        "XMLHttpRequest",
        Value::native("XMLHttpRequest", |_, _| {
            Err(RuntimeError::SecurityViolation(
                "XMLHttpRequest is blocked; use the injected sdk.API.fetch".into(),
            ))
        }),
    );

    env.define("Math", math());
    env.define("JSON", json());
    env.define("console", console());
    env.define("Object", object_helpers());
    env.define(
        "Array",
        Value::object_from([(
            "isArray",
            Value::native("isArray", |_, args| {
                Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))
            }),
        )]),
    );
    env.define(
        "String",
        Value::native("String", |_, args| Ok(Value::str(arg(&args, 0).to_display()))),
    );
    env.define(
        "Number",
        Value::native("Number", |_, args| Ok(Value::Number(arg(&args, 0).to_number()))),
    );
    env.define(
        "Boolean",
        Value::native("Boolean", |_, args| Ok(Value::Bool(arg(&args, 0).truthy()))),
    );
    env.define(
        "len",
        Value::native("len", |_: &Interpreter, args| {
            Ok(Value::Number(match arg(&args, 0) {
                Value::Array(items) => items.len() as f64,
                Value::Str(s) => s.chars().count() as f64,
                Value::Object(cell) => cell.len() as f64,
                _ => 0.0,
            }))
        }),
    );
    env
}
