//! Minimal JSON Schema checks for tool arguments, and schema generation for
//! typed parameter structs.

use serde_json::{Map, Value};

/// Object schema for `T` in the shape tool definitions expect.
///
/// `$schema` and `title` are dropped; the model only needs the object
/// description.
#[must_use]
pub fn params_schema<T: schemars::JsonSchema>() -> Value {
    let mut value = Value::from(schemars::schema_for!(T));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// Check `params` against an object schema.
///
/// Supports `type` (single or list), `required`, `properties`, `enum`,
/// `minimum`, `maximum`, `minLength`, `maxLength` and array `items`.
/// Unknown keywords are ignored.
#[must_use]
pub fn validate(schema: &Value, params: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    check_object(params, schema, "", &mut errors);
    errors
}

fn check_value(value: &Value, schema: &Value, path: &str, errors: &mut Vec<String>) {
    let label = if path.is_empty() { "parameter" } else { path };

    let types = schema_types(schema);
    if !types.is_empty() && !types.iter().any(|t| matches_type(value, t)) {
        errors.push(format!("{label} should be {}", types.join(" or ")));
        return;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array)
        && !allowed.contains(value)
    {
        errors.push(format!("{label} must be one of {}", Value::Array(allowed.clone())));
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
            && n < min
        {
            errors.push(format!("{label} must be >= {}", schema["minimum"]));
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
            && n > max
        {
            errors.push(format!("{label} must be <= {}", schema["maximum"]));
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
            && (len as u64) < min
        {
            errors.push(format!("{label} must be at least {min} chars"));
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
            && (len as u64) > max
        {
            errors.push(format!("{label} must be at most {max} chars"));
        }
    }

    match value {
        Value::Object(obj) => check_object(obj, schema, path, errors),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_value(item, item_schema, &format!("{path}[{i}]"), errors);
                }
            }
        }
        _ => {}
    }
}

fn check_object(obj: &Map<String, Value>, schema: &Value, path: &str, errors: &mut Vec<String>) {
    let join = |key: &str| {
        if path.is_empty() {
            key.to_owned()
        } else {
            format!("{path}.{key}")
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(key) {
                errors.push(format!("missing required {}", join(key)));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in obj {
            if let Some(prop_schema) = props.get(key) {
                check_value(value, prop_schema, &join(key), errors);
            }
        }
    }
}

/// Declared types; schemars renders `Option<T>` as `["T", "null"]`.
fn schema_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn matches_type(value: &Value, ty: &str) -> bool {
    match ty {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
