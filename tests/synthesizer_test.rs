use conformance_prober::openapi::Schema;
use conformance_prober::probe::{synthesize, validate_schema};
use serde_json::{json, Value};

fn schema(value: Value) -> Schema {
    serde_json::from_value(value).unwrap()
}

fn order_schema() -> Schema {
    schema(json!({
        "type": "object",
        "required": ["amount", "currency", "customer"],
        "properties": {
            "amount": {"type": "integer", "minimum": 1, "maximum": 1000},
            "currency": {"type": "string", "enum": ["EUR", "USD"]},
            "customer": {
                "type": "object",
                "required": ["email"],
                "properties": {
                    "email": {"type": "string", "format": "email"},
                    "phone": {"type": "string", "pattern": "^[0-9]{10}$"}
                }
            },
            "note": {"type": "string", "maxLength": 5},
            "tags": {"type": "array", "items": {"type": "string"}, "uniqueItems": true, "minItems": 2},
            "priority": {"type": "number", "exclusiveMinimum": 0, "maximum": 1},
            "rush": {"type": "boolean"},
            "coupon": {"type": "string", "nullable": true}
        }
    }))
}

#[test]
fn test_same_schema_same_value() {
    let s = order_schema();
    let first = synthesize(&s);
    for _ in 0..10 {
        assert_eq!(synthesize(&s), first);
    }
}

#[test]
fn test_required_fields_plus_at_most_three_optional() {
    let value = synthesize(&order_schema());
    let object = value.as_object().unwrap();

    for field in ["amount", "currency", "customer"] {
        assert!(object.contains_key(field), "missing required field {field}");
    }
    assert_eq!(object.len(), 3 + 3);
    assert!(!object.contains_key("rush"));
    assert!(!object.contains_key("coupon"));
}

#[test]
fn test_properties_follow_declaration_order() {
    let value = synthesize(&order_schema());
    let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        ["amount", "currency", "customer", "note", "tags", "priority"]
    );
}

#[test]
fn test_synthesized_values_validate_against_their_schema() {
    let schemas = [
        order_schema(),
        schema(json!({"type": "string", "pattern": "^[A-Z]{3}$"})),
        schema(json!({"type": "integer", "minimum": 500})),
        schema(json!({"type": "integer", "maximum": -20})),
        schema(json!({"type": "array", "items": {"type": "integer"}, "minItems": 2, "maxItems": 2})),
        schema(json!({"type": ["integer", "null"], "multipleOf": 7, "minimum": 10, "maximum": 30})),
        schema(json!({
            "allOf": [
                {"type": "object", "required": ["id"], "properties": {"id": {"type": "string", "format": "uuid"}}},
                {"type": "object", "required": ["created"], "properties": {"created": {"type": "string", "format": "date-time"}}}
            ]
        })),
        schema(json!({"oneOf": [{"type": "string", "minLength": 3}, {"type": "integer"}]})),
    ];

    for s in &schemas {
        let value = synthesize(s);
        let validation = validate_schema(&value, s);
        assert!(
            validation.valid,
            "{value} does not satisfy its schema: {:?}",
            validation.errors
        );
    }
}

#[test]
fn test_deeply_recursive_schema_terminates() {
    let mut nested = json!({"type": "object", "properties": {"leaf": {"type": "string"}}, "required": ["leaf"]});
    for _ in 0..30 {
        nested = json!({"type": "object", "required": ["child"], "properties": {"child": nested}});
    }
    let value = synthesize(&schema(nested));
    assert!(value.is_object());
}
