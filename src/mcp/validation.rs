//! Argument validation against a tool's declared input schema.
//!
//! Covers the structural subset of JSON Schema that tool schemas use in
//! practice: `type`, `required`, `properties`, `additionalProperties: false`,
//! `enum`, `items`, string length and numeric bounds. Unknown keywords are
//! ignored rather than rejected.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Human-readable JSON type name of a value.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        "number" => value.is_number(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn describe(path: &str) -> String {
    if path.is_empty() {
        "arguments".to_string()
    } else {
        format!("argument '{}'", path)
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// Validate tool arguments against an object schema.
pub fn validate_arguments(schema: &Value, args: &HashMap<String, Value>) -> Result<()> {
    let object: Map<String, Value> = args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    validate_value(schema, &Value::Object(object), "")
}

/// Validate one value against a schema fragment.
pub fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<()> {
    let Some(schema) = schema.as_object() else {
        // `true`/`{}`-style schemas accept anything.
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(value, t)) {
            return Err(Error::InvalidParams(format!(
                "{} must be of type {}, got {}",
                describe(path),
                allowed.join(" or "),
                type_name(value)
            )));
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            let listed: Vec<String> = options.iter().map(|o| o.to_string()).collect();
            return Err(Error::InvalidParams(format!(
                "{} must be one of [{}]",
                describe(path),
                listed.join(", ")
            )));
        }
    }

    match value {
        Value::String(s) => validate_string(schema, s, path)?,
        Value::Number(_) => validate_number(schema, value, path)?,
        Value::Array(items) => validate_array(schema, items, path)?,
        Value::Object(map) => validate_object(schema, map, path)?,
        _ => {}
    }

    Ok(())
}

fn validate_string(schema: &Map<String, Value>, s: &str, path: &str) -> Result<()> {
    let len = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if len < min {
            return Err(Error::InvalidParams(format!(
                "{} must be at least {} characters long",
                describe(path),
                min
            )));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if len > max {
            return Err(Error::InvalidParams(format!(
                "{} must be at most {} characters long",
                describe(path),
                max
            )));
        }
    }
    Ok(())
}

fn validate_number(schema: &Map<String, Value>, value: &Value, path: &str) -> Result<()> {
    let Some(n) = value.as_f64() else {
        return Ok(());
    };
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if n < min {
            return Err(Error::InvalidParams(format!(
                "{} must be >= {}",
                describe(path),
                min
            )));
        }
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if n > max {
            return Err(Error::InvalidParams(format!(
                "{} must be <= {}",
                describe(path),
                max
            )));
        }
    }
    Ok(())
}

fn validate_array(schema: &Map<String, Value>, items: &[Value], path: &str) -> Result<()> {
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if items.len() as u64 > max {
            return Err(Error::InvalidParams(format!(
                "{} must have at most {} items",
                describe(path),
                max
            )));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            validate_value(item_schema, item, &format!("{}[{}]", path, i))?;
        }
    }
    Ok(())
}

fn validate_object(schema: &Map<String, Value>, map: &Map<String, Value>, path: &str) -> Result<()> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for key in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(key) {
                return Err(Error::InvalidParams(format!(
                    "Missing required argument '{}'",
                    join(path, key)
                )));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(properties) = properties {
        // Sorted so the first reported violation is deterministic.
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(prop_schema) = properties.get(key) {
                validate_value(prop_schema, &map[key], &join(path, key))?;
            }
        }
    }

    match schema.get("additionalProperties") {
        Some(Value::Bool(false)) => {
            if let Some(extra) = map
                .keys()
                .find(|k| !properties.is_some_and(|p| p.contains_key(*k)))
            {
                return Err(Error::InvalidParams(format!(
                    "Unexpected argument '{}'",
                    join(path, extra)
                )));
            }
        }
        Some(extra_schema @ Value::Object(_)) => {
            for (key, value) in map {
                if !properties.is_some_and(|p| p.contains_key(key)) {
                    validate_value(extra_schema, value, &join(path, key))?;
                }
            }
        }
        _ => {}
    }

    Ok(())
}
