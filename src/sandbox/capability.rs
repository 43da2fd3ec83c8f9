/*!
 * Capability Scope
 * The only surface through which compiled app code reaches the host
 */

use super::interpreter::Interpreter;
use super::transport::{FetchRequest, Transport, PROCESS_ID_HEADER};
use super::types::{RuntimeError, RuntimeResult};
use super::value::Value;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Sink for actions raised by app code
pub type DispatchFn = Arc<dyn Fn(Json) + Send + Sync>;

/// Default length of `API.root_seed()`
pub const ROOT_SEED_LEN: usize = 8;

/// Component names only privileged scopes receive
pub const SYSTEM_COMPONENTS: [&str; 4] = ["Start", "Developer", "FileSystem", "NoteBook"];

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

/// Per-scope hook slots, indexed by call order within one render
#[derive(Default)]
struct HookStore {
    slots: Mutex<Vec<Value>>,
    cursor: Mutex<usize>,
    pending: Mutex<Vec<Value>>,
}

impl HookStore {
    /// Next slot index, and the slot's value when already initialised
    fn next(&self) -> (usize, Option<Value>) {
        let mut cursor = self.cursor.lock();
        let index = *cursor;
        *cursor += 1;
        (index, self.slots.lock().get(index).cloned())
    }

    fn store(&self, index: usize, value: Value) {
        let mut slots = self.slots.lock();
        if index < slots.len() {
            slots[index] = value;
        } else {
            slots.resize(index, Value::Null);
            slots.push(value);
        }
    }

    fn deps_changed(old: &Value, new: &Value) -> bool {
        new.is_null() || old.to_json() != new.to_json()
    }
}

/// Build a view node `{tag, props, children}`
///
/// Function tags are components and are called eagerly with their props
/// (plus `children`).
fn element(interp: &Interpreter, args: Vec<Value>) -> RuntimeResult<Value> {
    let mut args = args.into_iter();
    let tag = args.next().unwrap_or(Value::Null);
    let props = match args.next() {
        Some(Value::Object(cell)) => cell.entries().into_iter().collect::<BTreeMap<_, _>>(),
        _ => BTreeMap::new(),
    };
    let children = flatten_children(args);

    if tag.is_callable() {
        let mut props = props;
        props.insert("children".to_string(), Value::array(children));
        return interp.call(&tag, vec![Value::object(props)]);
    }
    Ok(node(tag, Value::object(props), children))
}

fn node(tag: Value, props: Value, children: Vec<Value>) -> Value {
    Value::object_from([
        ("tag", tag),
        ("props", props),
        ("children", Value::array(children)),
    ])
}

fn flatten_children(children: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out = Vec::new();
    for child in children {
        match child {
            Value::Null | Value::Bool(false) => {}
            Value::Array(items) => out.extend(flatten_children(items.iter().cloned())),
            other => out.push(other),
        }
    }
    out
}

fn ui_library() -> Value {
    let hooks = Arc::new(HookStore::default());

    let use_state = {
        let hooks = Arc::clone(&hooks);
        Value::native("use_state", move |interp, args| {
            let (index, current) = hooks.next();
            let value = match current {
                Some(value) => value,
                None => {
                    let init = arg(&args, 0);
                    let init = if init.is_callable() {
                        interp.call(&init, Vec::new())?
                    } else {
                        init
                    };
                    hooks.store(index, init.clone());
                    init
                }
            };
            let store = Arc::clone(&hooks);
            let setter = Value::native("set_state", move |interp, args| {
                let next = arg(&args, 0);
                let next = if next.is_callable() {
                    let current = store.slots.lock().get(index).cloned().unwrap_or_default();
                    interp.call(&next, vec![current])?
                } else {
                    next
                };
                store.store(index, next);
                Ok(Value::Null)
            });
            Ok(Value::array(vec![value, setter]))
        })
    };

    let use_memo = {
        let hooks = Arc::clone(&hooks);
        Value::native("use_memo", move |interp, args| {
            let (index, slot) = hooks.next();
            let deps = arg(&args, 1);
            if let Some(slot) = slot {
                if !HookStore::deps_changed(&slot.field("deps"), &deps) {
                    return Ok(slot.field("value"));
                }
            }
            let value = interp.call(&arg(&args, 0), Vec::new())?;
            hooks.store(
                index,
                Value::object_from([("deps", deps), ("value", value.clone())]),
            );
            Ok(value)
        })
    };

    let use_effect = {
        let hooks = Arc::clone(&hooks);
        Value::native("use_effect", move |_, args| {
            let (index, slot) = hooks.next();
            let effect = arg(&args, 0);
            let deps = arg(&args, 1);
            let due = match &slot {
                Some(old) => HookStore::deps_changed(old, &deps),
                None => true,
            };
            if due {
                hooks.store(index, deps);
                if effect.is_callable() {
                    hooks.pending.lock().push(effect);
                }
            }
            Ok(Value::Null)
        })
    };

    let use_ref = {
        let hooks = Arc::clone(&hooks);
        Value::native("use_ref", move |_, args| {
            let (index, slot) = hooks.next();
            Ok(slot.unwrap_or_else(|| {
                let cell = Value::object_from([("current", arg(&args, 0))]);
                hooks.store(index, cell.clone());
                cell
            }))
        })
    };

    let begin_render = {
        let hooks = Arc::clone(&hooks);
        Value::native("__begin_render", move |_, _| {
            *hooks.cursor.lock() = 0;
            Ok(Value::Null)
        })
    };

    let flush_effects = {
        let hooks = Arc::clone(&hooks);
        Value::native("__flush_effects", move |interp, _| {
            let effects = std::mem::take(&mut *hooks.pending.lock());
            let ran = effects.len();
            for effect in effects {
                interp.call(&effect, Vec::new())?;
            }
            Ok(Value::Number(ran as f64))
        })
    };

    Value::object_from([
        ("h", Value::native("h", element)),
        (
            "fragment",
            Value::native("fragment", |_, args| {
                Ok(node(
                    Value::str("fragment"),
                    Value::empty_object(),
                    flatten_children(args),
                ))
            }),
        ),
        ("use_state", use_state),
        ("use_memo", use_memo),
        ("use_effect", use_effect),
        ("use_ref", use_ref),
        ("__begin_render", begin_render),
        ("__flush_effects", flush_effects),
    ])
}

fn fetch_request(identity: &str, args: &[Value]) -> RuntimeResult<FetchRequest> {
    let url = match arg(args, 0) {
        Value::Str(url) => url.to_string(),
        other => {
            return Err(RuntimeError::Type(format!(
                "fetch expects a url string, got {}",
                other.type_name()
            )))
        }
    };
    let options = arg(args, 1);

    let method = match options.field("method") {
        Value::Null => "GET".to_string(),
        other => other.to_display().to_uppercase(),
    };
    let mut headers = BTreeMap::new();
    if let Some(cell) = options.field("headers").as_object() {
        for (name, value) in cell.entries() {
            headers.insert(name.to_lowercase(), value.to_display());
        }
    }
    // Apps can never impersonate another process
    headers.insert(PROCESS_ID_HEADER.to_string(), identity.to_string());

    let body = match options.field("body") {
        Value::Null => None,
        Value::Str(s) => Some(s.to_string()),
        other => Some(other.to_json().to_string()),
    };
    Ok(FetchRequest {
        url,
        method,
        headers,
        body,
    })
}

fn api_fetch(identity: String, transport: Arc<dyn Transport>) -> Value {
    Value::native("fetch", move |_, args| {
        let request = fetch_request(&identity, &args)?;
        debug!(pid = %identity, url = %request.url, method = %request.method, "App fetch");
        let response = transport.send(request)?;

        let ok = response.ok();
        let body: Arc<str> = Arc::from(response.body.as_str());
        let text = Arc::clone(&body);
        let headers = Value::object(
            response
                .headers
                .into_iter()
                .map(|(k, v)| (k, Value::str(v)))
                .collect(),
        );
        Ok(Value::object_from([
            ("status", Value::Number(f64::from(response.status))),
            ("ok", Value::Bool(ok)),
            ("headers", headers),
            ("body", Value::Str(body)),
            (
                "json",
                Value::native("json", move |_, _| {
                    serde_json::from_str::<Json>(&text)
                        .map(|json| Value::from_json(&json))
                        .map_err(|e| RuntimeError::Thrown(format!("invalid JSON body: {}", e)))
                }),
            ),
        ]))
    })
}

fn system_component(name: &'static str) -> Value {
    Value::native(name, move |_, args| {
        let props = match arg(&args, 0) {
            Value::Object(cell) => Value::Object(cell),
            _ => Value::empty_object(),
        };
        Ok(node(Value::str(format!("system:{}", name)), props, Vec::new()))
    })
}

/// Build the capability object handed to one app
///
/// `identity` is captured by value, so the process id header cannot be
/// changed from inside the app. `API` and `Components` are deep-frozen and
/// the top level is frozen; `UI` stays mutable.
pub fn create_capability_scope(
    dispatch: DispatchFn,
    identity: &str,
    privileged: bool,
    host: Arc<dyn Transport>,
) -> Value {
    let navigate = {
        let dispatch = Arc::clone(&dispatch);
        Value::native("navigate", move |_, args| {
            dispatch(json!({"type": "NAVIGATE", "payload": arg(&args, 0).to_json()}));
            Ok(Value::Null)
        })
    };

    let mut api = BTreeMap::new();
    api.insert("fetch".to_string(), api_fetch(identity.to_string(), host));
    api.insert("navigate".to_string(), navigate);
    let mut components = BTreeMap::new();

    if privileged {
        api.insert(
            "root_seed".to_string(),
            Value::native("root_seed", |_, args| {
                let len = match arg(&args, 0) {
                    Value::Number(n) if n >= 1.0 => n as usize,
                    _ => ROOT_SEED_LEN,
                };
                let seed: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(len)
                    .map(char::from)
                    .collect();
                Ok(Value::str(seed))
            }),
        );
        let dispatch = Arc::clone(&dispatch);
        api.insert(
            "open_directory".to_string(),
            Value::native("open_directory", move |_, _| {
                dispatch(json!({
                    "type": "KERNEL_CALL",
                    "payload": {"method": "OPEN_DIRECTORY", "args": []}
                }));
                Ok(Value::Null)
            }),
        );
        for name in SYSTEM_COMPONENTS {
            components.insert(name.to_string(), system_component(name));
        }
    }

    let api = Value::object(api);
    let components = Value::object(components);
    api.deep_freeze();
    components.deep_freeze();

    let scope = Value::object_from([
        ("UI", ui_library()),
        ("API", api),
        ("Components", components),
    ]);
    if let Some(cell) = scope.as_object() {
        cell.freeze();
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::transport::RecordingTransport;
    use pretty_assertions::assert_eq;

    fn collecting() -> (DispatchFn, Arc<Mutex<Vec<Json>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Arc::new(move |action| sink.lock().push(action)), seen)
    }

    #[test]
    fn test_fetch_stamps_identity() {
        let transport = Arc::new(RecordingTransport::new().with_response(200, "{\"n\":1}"));
        let (dispatch, _) = collecting();
        let caps = create_capability_scope(dispatch, "pid-1", false, transport.clone());

        let interp = Interpreter::new();
        let options = Value::object_from([(
            "headers",
            Value::object_from([(PROCESS_ID_HEADER, Value::str("forged"))]),
        )]);
        let response = interp
            .call(
                &caps.field("API").field("fetch"),
                vec![Value::str("https://example.com/x"), options],
            )
            .unwrap();
        assert!(response.field("ok").truthy());

        let json = interp.call(&response.field("json"), Vec::new()).unwrap();
        assert_eq!(json.to_json(), json!({"n": 1}));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].headers.get(PROCESS_ID_HEADER).unwrap(), "pid-1");
        assert_eq!(requests[0].method, "GET");
    }

    #[test]
    fn test_privileged_scope_adds_system_surface() {
        let (dispatch, seen) = collecting();
        let caps = create_capability_scope(
            dispatch,
            "system-pid-x",
            true,
            Arc::new(RecordingTransport::new()),
        );
        let interp = Interpreter::new();

        let seed = interp
            .call(&caps.field("API").field("root_seed"), Vec::new())
            .unwrap();
        assert_eq!(seed.as_str().unwrap().len(), ROOT_SEED_LEN);

        interp
            .call(&caps.field("API").field("open_directory"), Vec::new())
            .unwrap();
        assert_eq!(seen.lock()[0]["payload"]["method"], "OPEN_DIRECTORY");

        for name in SYSTEM_COMPONENTS {
            assert!(caps.field("Components").field(name).is_callable());
        }
    }

    #[test]
    fn test_base_scope_is_frozen_but_ui_is_not() {
        let (dispatch, _) = collecting();
        let caps = create_capability_scope(dispatch, "p", false, Arc::new(RecordingTransport::new()));

        assert!(caps.field("API").field("root_seed").is_null());
        assert!(caps.field("Components").as_object().unwrap().is_empty());
        assert!(caps.field("API").as_object().unwrap().set("fetch", Value::Null).is_err());
        assert!(caps.as_object().unwrap().set("API", Value::Null).is_err());
        assert!(caps.field("UI").as_object().unwrap().set("extra", Value::Null).is_ok());
    }

    #[test]
    fn test_use_state_persists_across_renders() {
        let (dispatch, _) = collecting();
        let caps = create_capability_scope(dispatch, "p", false, Arc::new(RecordingTransport::new()));
        let ui = caps.field("UI");
        let interp = Interpreter::new();

        interp.call(&ui.field("__begin_render"), Vec::new()).unwrap();
        let pair = interp.call(&ui.field("use_state"), vec![Value::Number(1.0)]).unwrap();
        let setter = match &pair {
            Value::Array(items) => items[1].clone(),
            _ => unreachable!(),
        };
        interp.call(&setter, vec![Value::Number(5.0)]).unwrap();

        interp.call(&ui.field("__begin_render"), Vec::new()).unwrap();
        let pair = interp.call(&ui.field("use_state"), vec![Value::Number(1.0)]).unwrap();
        assert_eq!(pair.to_json()[0], json!(5));
    }

    #[test]
    fn test_h_flattens_children_and_calls_components() {
        let (dispatch, _) = collecting();
        let caps = create_capability_scope(dispatch, "p", false, Arc::new(RecordingTransport::new()));
        let interp = Interpreter::new();
        let h = caps.field("UI").field("h");

        let tree = interp
            .call(
                &h,
                vec![
                    Value::str("ul"),
                    Value::Null,
                    Value::array(vec![Value::str("a"), Value::Null, Value::str("b")]),
                ],
            )
            .unwrap();
        assert_eq!(
            tree.to_json(),
            json!({"tag": "ul", "props": {}, "children": ["a", "b"]})
        );
    }
}
