//! Structural JSON Schema inference from one sample document.
//!
//! Objects list every observed property as required; array items from all elements are
//! merged into one schema. Values of incompatible types merge into `anyOf`.

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

pub const SCHEMA_DIALECT: &str = "http://json-schema.org/schema#";

/// Infer a JSON Schema document describing `sample`.
pub fn infer_schema(sample: &Value) -> Value {
    let mut schema = infer(sample);
    if let Value::Object(map) = &mut schema {
        map.insert("$schema".to_string(), Value::String(SCHEMA_DIALECT.to_string()));
    }
    schema
}

fn infer(value: &Value) -> Value {
    match value {
        Value::Null => json!({"type": "null"}),
        Value::Bool(_) => json!({"type": "boolean"}),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({"type": "integer"}),
        Value::Number(_) => json!({"type": "number"}),
        Value::String(_) => json!({"type": "string"}),
        Value::Array(items) => {
            let merged = items.iter().map(infer).reduce(merge);
            match merged {
                Some(items) => json!({"type": "array", "items": items}),
                None => json!({"type": "array"}),
            }
        }
        Value::Object(fields) => {
            let properties: Map<String, Value> = fields
                .iter()
                .map(|(name, value)| (name.clone(), infer(value)))
                .collect();
            let required: Vec<Value> = fields.keys().cloned().map(Value::String).collect();
            json!({"type": "object", "properties": properties, "required": required})
        }
    }
}

fn type_of(schema: &Value) -> Option<&str> {
    schema.get("type").and_then(Value::as_str)
}

fn variants(schema: Value) -> Vec<Value> {
    match schema {
        Value::Object(mut map) if map.contains_key("anyOf") => match map.remove("anyOf") {
            Some(Value::Array(variants)) => variants,
            _ => Vec::new(),
        },
        other => vec![other],
    }
}

fn merge(left: Value, right: Value) -> Value {
    let mut merged: Vec<Value> = Vec::new();
    for candidate in variants(left).into_iter().chain(variants(right)) {
        match merged
            .iter()
            .position(|existing| compatible(type_of(existing), type_of(&candidate)))
        {
            Some(idx) => {
                let existing = std::mem::take(&mut merged[idx]);
                merged[idx] = merge_same(existing, candidate);
            }
            None => merged.push(candidate),
        }
    }
    if merged.len() == 1 {
        merged.remove(0)
    } else {
        json!({"anyOf": merged})
    }
}

fn compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b || (is_numeric(a) && is_numeric(b)),
        _ => false,
    }
}

fn is_numeric(kind: &str) -> bool {
    kind == "integer" || kind == "number"
}

fn merge_same(left: Value, right: Value) -> Value {
    match (type_of(&left), type_of(&right)) {
        (Some("object"), Some("object")) => merge_objects(left, right),
        (Some("array"), Some("array")) => match (left.get("items"), right.get("items")) {
            (Some(a), Some(b)) => json!({"type": "array", "items": merge(a.clone(), b.clone())}),
            (Some(items), None) | (None, Some(items)) => json!({"type": "array", "items": items}),
            (None, None) => json!({"type": "array"}),
        },
        (Some(a), Some(b)) if a != b => json!({"type": "number"}),
        _ => left,
    }
}

fn merge_objects(left: Value, right: Value) -> Value {
    let props = |schema: &Value| -> Map<String, Value> {
        schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    };
    let required = |schema: &Value| -> BTreeSet<String> {
        schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut properties = props(&left);
    for (name, schema) in props(&right) {
        let merged = match properties.remove(&name) {
            Some(existing) => merge(existing, schema),
            None => schema,
        };
        properties.insert(name, merged);
    }

    // A property stays required only if every sample carried it.
    let required: Vec<Value> = required(&left)
        .intersection(&required(&right))
        .cloned()
        .map(Value::String)
        .collect();

    json!({"type": "object", "properties": properties, "required": required})
}
