//! Deep merge of partial JSON patches into profile documents.
//!
//! Nothing here knows about the profile template: the merge is generic over
//! JSON objects, and callers decide which keys are acceptable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON object.
pub type Map = serde_json::Map<String, Value>;

/// Recursively merge `patch` into `base` and return `base`.
///
/// Where both sides hold an object the two are merged key by key. In every
/// other case the patch value replaces the base value wholesale, including a
/// scalar over an object (or the reverse) and a list over a list. Keys that
/// are absent from `patch` are left untouched.
pub fn deep_merge<'a>(base: &'a mut Map, patch: &Map) -> &'a mut Map {
    for (key, value) in patch {
        if let (Some(Value::Object(existing)), Value::Object(nested)) = (base.get_mut(key), value) {
            deep_merge(existing, nested);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
    base
}

/// One `{path, value}` set-operation, with a dot-separated field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

impl PatchOp {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Convert set-operations into the equivalent nested mapping patch.
///
/// `sat.math = 700` becomes `{"sat": {"math": 700}}`. Ops with a blank path
/// are skipped, as are empty segments (`"sat..math"` is `"sat.math"`). Later
/// ops win over earlier ones on the same path.
pub fn ops_to_patch(ops: &[PatchOp]) -> Map {
    let mut patch = Map::new();
    for op in ops {
        let parts: Vec<&str> = op
            .path
            .split('.')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        insert_path(&mut patch, &parts, op.value.clone());
    }
    patch
}

/// Set `value` at `parts`, replacing any non-object on the way.
fn insert_path(map: &mut Map, parts: &[&str], value: Value) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.to_string(), value);
        return;
    }
    let slot = map
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(child) = slot {
        insert_path(child, rest, value);
    }
}

/// Look up a dot-separated path inside a JSON document.
pub fn get_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(value, |cur, part| cur.as_object()?.get(part))
}
