/// Serde helper functions for `skip_serializing_if` and JSON plumbing
use serde_json::{Map, Value};

/// Skip serializing if Option is None
pub fn is_none<T>(value: &Option<T>) -> bool {
    value.is_none()
}

/// Skip serializing if value is false
pub fn is_false(value: &bool) -> bool {
    !*value
}

/// Skip serializing if a JSON map is empty
pub fn is_empty_map(value: &Map<String, Value>) -> bool {
    value.is_empty()
}

/// Shallow merge of `patch` into `target`; non-object patches are ignored
pub fn merge_shallow(target: &mut Value, patch: Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            target.insert(key, value);
        }
    }
}
