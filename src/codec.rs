//! Transport codec for inspector payloads.
//!
//! Inspector surfaces exchange values that plain JSON cannot carry: cyclic
//! structures, aliased subtrees, error objects, opaque functions and
//! `undefined` slots. This codec encodes a [`Value`] graph into a JSON string
//! using in-band markers (`$ref`, `$error`, `$function`, `$undefined`,
//! `$number`) and restores the graph, shared cells included, on decode.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::{json, Value as Json};
use thiserror::Error;

/// Shared, mutable array node. Cloning shares the underlying cell.
pub type ArrayCell = Rc<RefCell<Vec<Value>>>;

/// Shared, mutable object node with insertion-ordered entries.
pub type ObjectCell = Rc<RefCell<Vec<(String, Value)>>>;

/// A value as seen by the inspector: JSON plus the shapes JSON cannot hold.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    /// A slot that exists but carries no value.
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    /// An error object, reduced to its message.
    Error(String),
    /// An opaque function, reduced to its name.
    Function(String),
    Array(ArrayCell),
    Object(ObjectCell),
}

impl Value {
    /// Build an array node from owned items.
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// Build an object node from owned entries.
    pub fn object(entries: Vec<(String, Value)>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    /// Convert a plain JSON tree into a fresh (unshared) value graph.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(entries) => Value::object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Errors produced while decoding a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not valid JSON.
    #[error("malformed payload: {0}")]
    Parse(#[from] serde_json::Error),

    /// A `$ref` marker points at a path that does not exist in the payload.
    #[error("dangling reference: {0}")]
    DanglingRef(String),

    /// A cyclic value cannot be flattened into a JSON tree.
    #[error("payload contains a cycle and cannot be read as a tree")]
    CyclicPayload,
}

/// Encode a value graph into a transportable JSON string.
///
/// The first visit to a shared node serializes it in place; every later
/// visit emits a `{"$ref": "<path>"}` marker, so cycles and aliases survive
/// the trip.
pub fn encode(value: &Value) -> String {
    let mut seen = HashMap::new();
    encode_node(value, "$", &mut seen).to_string()
}

/// Encode a plain JSON tree (no sharing) into the transport format.
pub fn encode_json(json: &Json) -> String {
    encode(&Value::from_json(json))
}

fn encode_node(value: &Value, path: &str, seen: &mut HashMap<usize, String>) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Undefined => json!({ "$undefined": true }),
        Value::Bool(b) => json!(b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => json!(s),
        Value::Error(message) => json!({ "$error": message }),
        Value::Function(name) => json!({ "$function": name }),
        Value::Array(cell) => {
            let key = Rc::as_ptr(cell) as usize;
            if let Some(existing) = seen.get(&key) {
                return json!({ "$ref": existing });
            }
            seen.insert(key, path.to_string());
            let items = cell.borrow();
            Json::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| encode_node(item, &format!("{path}[{i}]"), seen))
                    .collect(),
            )
        }
        Value::Object(cell) => {
            let key = Rc::as_ptr(cell) as usize;
            if let Some(existing) = seen.get(&key) {
                return json!({ "$ref": existing });
            }
            seen.insert(key, path.to_string());
            let entries = cell.borrow();
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (name, entry) in entries.iter() {
                map.insert(name.clone(), encode_node(entry, &format!("{path}.{name}"), seen));
            }
            Json::Object(map)
        }
    }
}

/// Numbers live as f64 in the graph (matching what inspector surfaces use),
/// so integral values must be written back without a fractional part or
/// integer-typed fields would not survive a decode.
fn number_to_json(n: f64) -> Json {
    const SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= SAFE_INTEGER {
        return Json::Number(serde_json::Number::from(n as i64));
    }
    match serde_json::Number::from_f64(n) {
        Some(num) => Json::Number(num),
        // NaN and infinities have no JSON literal.
        None => json!({ "$number": non_finite_tag(n) }),
    }
}

fn non_finite_tag(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

enum RefSlot {
    Array(ArrayCell, usize),
    Object(ObjectCell, usize),
}

/// Decode a transport string back into a value graph.
///
/// `$ref` markers are patched to share the referenced cell, restoring cycles
/// and aliases exactly.
pub fn decode(input: &str) -> Result<Value, CodecError> {
    let tree: Json = serde_json::from_str(input)?;
    let mut nodes = HashMap::new();
    let mut refs = Vec::new();
    let root = build_node(&tree, "$".to_string(), &mut nodes, &mut refs)?;

    for (slot, target) in refs {
        let resolved = nodes
            .get(&target)
            .cloned()
            .ok_or(CodecError::DanglingRef(target))?;
        match slot {
            RefSlot::Array(cell, index) => cell.borrow_mut()[index] = resolved,
            RefSlot::Object(cell, index) => cell.borrow_mut()[index].1 = resolved,
        }
    }
    Ok(root)
}

/// Decode a transport string into a plain JSON tree, expanding shared
/// references by copying. Cyclic payloads are rejected.
pub fn decode_to_json(input: &str) -> Result<Json, CodecError> {
    let value = decode(input)?;
    let mut active = Vec::new();
    value_to_json(&value, &mut active)
}

fn build_node(
    tree: &Json,
    path: String,
    nodes: &mut HashMap<String, Value>,
    refs: &mut Vec<(RefSlot, String)>,
) -> Result<Value, CodecError> {
    match tree {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(items) => {
            let cell: ArrayCell = Rc::new(RefCell::new(Vec::with_capacity(items.len())));
            nodes.insert(path.clone(), Value::Array(cell.clone()));
            for (i, item) in items.iter().enumerate() {
                let child_path = format!("{path}[{i}]");
                if let Some(target) = ref_target(item) {
                    cell.borrow_mut().push(Value::Null);
                    refs.push((RefSlot::Array(cell.clone(), i), target));
                } else {
                    let child = build_node(item, child_path, nodes, refs)?;
                    cell.borrow_mut().push(child);
                }
            }
            Ok(Value::Array(cell))
        }
        Json::Object(entries) => {
            if let Some(marker) = decode_marker(entries) {
                return marker;
            }
            let cell: ObjectCell = Rc::new(RefCell::new(Vec::with_capacity(entries.len())));
            nodes.insert(path.clone(), Value::Object(cell.clone()));
            for (index, (name, entry)) in entries.iter().enumerate() {
                let child_path = format!("{path}.{name}");
                if let Some(target) = ref_target(entry) {
                    cell.borrow_mut().push((name.clone(), Value::Null));
                    refs.push((RefSlot::Object(cell.clone(), index), target));
                } else {
                    let child = build_node(entry, child_path, nodes, refs)?;
                    cell.borrow_mut().push((name.clone(), child));
                }
            }
            Ok(Value::Object(cell))
        }
    }
}

fn ref_target(tree: &Json) -> Option<String> {
    let entries = tree.as_object()?;
    if entries.len() != 1 {
        return None;
    }
    entries.get("$ref")?.as_str().map(str::to_string)
}

fn decode_marker(
    entries: &serde_json::Map<String, Json>,
) -> Option<Result<Value, CodecError>> {
    if entries.len() != 1 {
        return None;
    }
    let (key, inner) = entries.iter().next()?;
    match key.as_str() {
        "$undefined" => Some(Ok(Value::Undefined)),
        "$error" => inner
            .as_str()
            .map(|message| Ok(Value::Error(message.to_string()))),
        "$function" => inner.as_str().map(|name| Ok(Value::Function(name.to_string()))),
        "$number" => match inner.as_str() {
            Some("NaN") => Some(Ok(Value::Number(f64::NAN))),
            Some("Infinity") => Some(Ok(Value::Number(f64::INFINITY))),
            Some("-Infinity") => Some(Ok(Value::Number(f64::NEG_INFINITY))),
            _ => None,
        },
        "$ref" => {
            // A root-level ref has nothing to point back into.
            Some(Err(CodecError::DanglingRef(
                inner.as_str().unwrap_or_default().to_string(),
            )))
        }
        _ => None,
    }
}

fn value_to_json(value: &Value, active: &mut Vec<usize>) -> Result<Json, CodecError> {
    match value {
        Value::Null | Value::Undefined => Ok(Json::Null),
        Value::Bool(b) => Ok(json!(b)),
        Value::Number(n) => Ok(number_to_json(*n)),
        Value::String(s) => Ok(json!(s)),
        Value::Error(message) => Ok(json!({ "$error": message })),
        Value::Function(name) => Ok(json!({ "$function": name })),
        Value::Array(cell) => {
            let key = Rc::as_ptr(cell) as usize;
            if active.contains(&key) {
                return Err(CodecError::CyclicPayload);
            }
            active.push(key);
            let items = cell.borrow();
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(value_to_json(item, active)?);
            }
            active.pop();
            Ok(Json::Array(out))
        }
        Value::Object(cell) => {
            let key = Rc::as_ptr(cell) as usize;
            if active.contains(&key) {
                return Err(CodecError::CyclicPayload);
            }
            active.push(key);
            let entries = cell.borrow();
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (name, entry) in entries.iter() {
                map.insert(name.clone(), value_to_json(entry, active)?);
            }
            active.pop();
            Ok(Json::Object(map))
        }
    }
}

/// Structural equivalence over value graphs, cycle-safe.
///
/// Numbers compare by bit pattern so `NaN` round-trips as equal.
pub fn structurally_eq(a: &Value, b: &Value) -> bool {
    let mut visited = HashSet::new();
    eq_inner(a, b, &mut visited)
}

fn eq_inner(a: &Value, b: &Value, visited: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Error(x), Value::Error(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            let pair = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if !visited.insert(pair) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(l, r)| eq_inner(l, r, visited))
        }
        (Value::Object(x), Value::Object(y)) => {
            let pair = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if !visited.insert(pair) {
                return true;
            }
            let xs = x.borrow();
            let ys = y.borrow();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|((lk, lv), (rk, rv))| lk == rk && eq_inner(lv, rv, visited))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_nested_containers() {
        let value = Value::object(vec![
            ("count".to_string(), Value::Number(3.0)),
            (
                "items".to_string(),
                Value::array(vec![
                    Value::String("a".to_string()),
                    Value::Bool(true),
                    Value::Null,
                ]),
            ),
        ]);

        let decoded = decode(&encode(&value)).unwrap();
        assert!(structurally_eq(&value, &decoded));
    }

    #[test]
    fn roundtrip_cycle() {
        let root = Value::object(vec![("name".to_string(), Value::String("loop".to_string()))]);
        if let Value::Object(cell) = &root {
            cell.borrow_mut().push(("self".to_string(), root.clone()));
        }

        let encoded = encode(&root);
        assert!(encoded.contains("$ref"));

        let decoded = decode(&encoded).unwrap();
        assert!(structurally_eq(&root, &decoded));

        // The cycle is a real shared cell, not a copy.
        if let Value::Object(cell) = &decoded {
            let entries = cell.borrow();
            match &entries[1].1 {
                Value::Object(inner) => assert!(Rc::ptr_eq(inner, cell)),
                other => panic!("expected object, got {other:?}"),
            }
        }
    }

    #[test]
    fn roundtrip_aliased_subtree() {
        let shared = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        let value = Value::object(vec![
            ("left".to_string(), shared.clone()),
            ("right".to_string(), shared),
        ]);

        let decoded = decode(&encode(&value)).unwrap();
        assert!(structurally_eq(&value, &decoded));

        if let Value::Object(cell) = &decoded {
            let entries = cell.borrow();
            match (&entries[0].1, &entries[1].1) {
                (Value::Array(left), Value::Array(right)) => assert!(Rc::ptr_eq(left, right)),
                other => panic!("expected aliased arrays, got {other:?}"),
            }
        }
    }

    #[test]
    fn roundtrip_error_function_and_undefined() {
        let value = Value::array(vec![
            Value::Error("boom".to_string()),
            Value::Function("increment".to_string()),
            Value::Undefined,
        ]);

        let decoded = decode(&encode(&value)).unwrap();
        assert!(structurally_eq(&value, &decoded));
    }

    #[test]
    fn roundtrip_non_finite_numbers() {
        let value = Value::array(vec![
            Value::Number(f64::NAN),
            Value::Number(f64::INFINITY),
            Value::Number(f64::NEG_INFINITY),
        ]);

        let decoded = decode(&encode(&value)).unwrap();
        assert!(structurally_eq(&value, &decoded));
    }

    #[test]
    fn decode_to_json_expands_aliases() {
        let shared = Value::array(vec![Value::Number(7.0)]);
        let value = Value::object(vec![
            ("a".to_string(), shared.clone()),
            ("b".to_string(), shared),
        ]);

        let json = decode_to_json(&encode(&value)).unwrap();
        assert_eq!(json["a"], json!([7]));
        assert_eq!(json["b"], json!([7]));
    }

    #[test]
    fn decode_to_json_rejects_cycles() {
        let root = Value::object(vec![]);
        if let Value::Object(cell) = &root {
            cell.borrow_mut().push(("me".to_string(), root.clone()));
        }

        let err = decode_to_json(&encode(&root)).unwrap_err();
        assert!(matches!(err, CodecError::CyclicPayload));
    }

    #[test]
    fn dangling_ref_is_an_error() {
        let err = decode(r#"{"a": {"$ref": "$.missing"}}"#).unwrap_err();
        assert!(matches!(err, CodecError::DanglingRef(_)));
    }

    #[test]
    fn encode_json_matches_plain_serialization() {
        let json = json!({"kind": "counter/add", "amount": 4});
        let decoded = decode_to_json(&encode_json(&json)).unwrap();
        assert_eq!(decoded, json);
    }
}
