use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::openapi::Schema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON pointer into the validated body; empty for the root.
    pub instance_path: String,
    pub message: String,
    pub keyword: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaValidation {
    pub valid: bool,
    pub errors: Vec<SchemaViolation>,
}

impl SchemaValidation {
    pub fn failed(keyword: &str, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![SchemaViolation {
                instance_path: String::new(),
                message: message.into(),
                keyword: keyword.to_string(),
            }],
        }
    }
}

/// Validate `body` against an OpenAPI schema, reporting every violation.
///
/// The validator is compiled for this call only. A schema that cannot be compiled
/// yields a single `schema` violation instead of an error.
pub fn validate_schema(body: &Value, schema: &Schema) -> SchemaValidation {
    let json_schema = match to_json_schema(schema) {
        Ok(s) => s,
        Err(e) => {
            return SchemaValidation::failed("schema", format!("Schema is not serializable: {}", e))
        }
    };

    let validator = match jsonschema::validator_for(&json_schema) {
        Ok(v) => v,
        Err(e) => {
            return SchemaValidation::failed("schema", format!("Schema failed to compile: {}", e))
        }
    };

    let errors: Vec<SchemaViolation> = validator
        .iter_errors(body)
        .map(|error| {
            let schema_path = error.schema_path.to_string();
            SchemaViolation {
                instance_path: error.instance_path.to_string(),
                keyword: schema_path
                    .rsplit('/')
                    .find(|segment| !segment.is_empty())
                    .unwrap_or("schema")
                    .to_string(),
                message: error.to_string(),
            }
        })
        .collect();

    SchemaValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Standard JSON Schema for an OpenAPI schema: `nullable` becomes a type union and
/// boolean exclusive bounds become numeric ones.
pub fn to_json_schema(schema: &Schema) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(schema)?;
    rewrite_dialect(&mut value);
    Ok(value)
}

fn rewrite_dialect(value: &mut Value) {
    let Value::Object(map) = value else {
        return;
    };

    if map.remove("nullable") == Some(Value::Bool(true)) {
        allow_null(map);
    }
    numeric_exclusive_bound(map, "exclusiveMinimum", "minimum");
    numeric_exclusive_bound(map, "exclusiveMaximum", "maximum");

    for key in [
        "properties",
        "patternProperties",
        "dependentSchemas",
        "$defs",
        "definitions",
    ] {
        if let Some(Value::Object(named)) = map.get_mut(key) {
            named.values_mut().for_each(rewrite_dialect);
        }
    }
    for key in [
        "items",
        "additionalProperties",
        "not",
        "contains",
        "propertyNames",
        "additionalItems",
        "unevaluatedItems",
        "unevaluatedProperties",
        "if",
        "then",
        "else",
    ] {
        if let Some(nested) = map.get_mut(key) {
            rewrite_dialect(nested);
        }
    }
    for key in ["allOf", "oneOf", "anyOf", "prefixItems"] {
        if let Some(Value::Array(branches)) = map.get_mut(key) {
            branches.iter_mut().for_each(rewrite_dialect);
        }
    }
}

fn allow_null(map: &mut Map<String, Value>) {
    let widened = match map.get("type") {
        Some(Value::String(single)) => Some(Value::Array(vec![
            Value::String(single.clone()),
            Value::from("null"),
        ])),
        Some(Value::Array(types)) if !types.iter().any(|t| t == "null") => {
            let mut types = types.clone();
            types.push(Value::from("null"));
            Some(Value::Array(types))
        }
        _ => None,
    };
    if let Some(types) = widened {
        map.insert("type".to_string(), types);
    }
    if let Some(Value::Array(values)) = map.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
    }
}

/// `exclusiveMinimum: true, minimum: 5` → `exclusiveMinimum: 5`.
fn numeric_exclusive_bound(map: &mut Map<String, Value>, exclusive_key: &str, bound_key: &str) {
    if let Some(Value::Bool(flag)) = map.get(exclusive_key).cloned() {
        map.remove(exclusive_key);
        if flag {
            if let Some(bound) = map.remove(bound_key) {
                map.insert(exclusive_key.to_string(), bound);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(value: Value) -> Schema {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_nullable_string_accepts_null_rejects_number() {
        let s = schema(json!({"type": "string", "nullable": true}));
        assert!(validate_schema(&json!("hello"), &s).valid);
        assert!(validate_schema(&Value::Null, &s).valid);

        let result = validate_schema(&json!(42), &s);
        assert!(!result.valid);
        assert_eq!(result.errors[0].keyword, "type");
    }

    #[test]
    fn test_nullable_rewrite_reaches_nested_properties() {
        let s = schema(json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string", "nullable": true}}
            }
        }));
        assert!(validate_schema(&json!({"tags": ["a", null]}), &s).valid);
    }

    #[test]
    fn test_every_violation_reported_with_path() {
        let s = schema(json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
        }));
        let result = validate_schema(&json!({"id": "abc"}), &s);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);

        let type_error = result
            .errors
            .iter()
            .find(|e| e.keyword == "type")
            .expect("type violation");
        assert_eq!(type_error.instance_path, "/id");
        assert!(result.errors.iter().any(|e| e.keyword == "required"));
    }

    #[test]
    fn test_boolean_exclusive_minimum_is_rewritten() {
        let s = schema(json!({"type": "number", "minimum": 0, "exclusiveMinimum": true}));
        let rewritten = to_json_schema(&s).unwrap();
        assert_eq!(rewritten["exclusiveMinimum"], json!(0.0));
        assert!(rewritten.get("minimum").is_none());

        assert!(!validate_schema(&json!(0), &s).valid);
        assert!(validate_schema(&json!(0.5), &s).valid);
    }

    #[test]
    fn test_object_size_constraints_enforced() {
        let s = schema(json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "maxProperties": 1
        }));
        assert!(validate_schema(&json!({"a": "x"}), &s).valid);
        let result = validate_schema(&json!({"a": "x", "b": "y"}), &s);
        assert!(!result.valid);
        assert_eq!(result.errors[0].keyword, "maxProperties");

        let s = schema(json!({"type": "object", "minProperties": 1}));
        assert!(!validate_schema(&json!({}), &s).valid);
    }

    #[test]
    fn test_not_keyword_enforced_and_rewritten() {
        let s = schema(json!({"not": {"type": "string"}}));
        let result = validate_schema(&json!("x"), &s);
        assert!(!result.valid);
        assert_eq!(result.errors[0].keyword, "not");
        assert!(validate_schema(&json!(1), &s).valid);

        let s = schema(json!({"not": {"type": "integer", "nullable": true}}));
        assert!(!validate_schema(&Value::Null, &s).valid);
    }

    #[test]
    fn test_nullable_enum_accepts_null() {
        let s = schema(json!({"type": "string", "enum": ["a", "b"], "nullable": true}));
        assert!(validate_schema(&Value::Null, &s).valid);
        assert!(!validate_schema(&json!("c"), &s).valid);
    }
}
