//! Deterministic example values for schemas.
//!
//! Same schema in, same value out: baseline probes must be reproducible, so nothing
//! here is random and property order follows declaration order.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::LazyLock;

use crate::openapi::{ExclusiveBound, JsonType, Schema};

/// Optional properties added beyond the required ones.
const MAX_OPTIONAL_PROPERTIES: usize = 3;
const MAX_ARRAY_ITEMS: u64 = 3;
/// Nesting beyond this collapses to empty containers.
const MAX_DEPTH: usize = 12;

const DEFAULT_MINIMUM: f64 = 0.0;
const DEFAULT_MAXIMUM: f64 = 100.0;
const DEFAULT_RANGE: f64 = DEFAULT_MAXIMUM - DEFAULT_MINIMUM;

const STRING_PLACEHOLDER: &str = "example";
const STRING_PADDING: u64 = 10;

static QUANTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)(?:,(\d*))?\}").expect("valid quantifier regex"));

/// Produce a value conforming to `schema`. Total: every schema yields something.
pub fn synthesize(schema: &Schema) -> Value {
    synthesize_at(schema, 0)
}

fn synthesize_at(schema: &Schema, depth: usize) -> Value {
    if let Some(example) = &schema.example {
        return example.clone();
    }
    if let Some(default) = &schema.default {
        return default.clone();
    }
    if let Some(first) = schema.enum_values.as_ref().and_then(|values| values.first()) {
        return first.clone();
    }
    if let Some(constant) = &schema.const_value {
        return constant.clone();
    }
    if depth > MAX_DEPTH {
        return empty_container(schema);
    }
    if !schema.all_of.is_empty() {
        return merge_all_of(schema, depth);
    }
    // Only the first branch: one valid shape is enough for a baseline.
    if let Some(first) = schema.one_of.first().or_else(|| schema.any_of.first()) {
        return synthesize_at(first, depth + 1);
    }

    match schema.primary_type() {
        Some(JsonType::Object) => synthesize_object(schema, depth),
        Some(JsonType::Array) => synthesize_array(schema, depth),
        Some(JsonType::String) => synthesize_string(schema),
        Some(JsonType::Integer) => synthesize_number(schema, true),
        Some(JsonType::Number) => synthesize_number(schema, false),
        Some(JsonType::Boolean) => Value::Bool(true),
        Some(JsonType::Null) => Value::Null,
        None if schema.is_nullable() && schema.properties.is_empty() => Value::Null,
        None if !schema.properties.is_empty() => synthesize_object(schema, depth),
        None if schema.items.is_some() => synthesize_array(schema, depth),
        None => Value::Object(Map::new()),
    }
}

fn empty_container(schema: &Schema) -> Value {
    match schema.primary_type() {
        Some(JsonType::Array) => Value::Array(Vec::new()),
        Some(JsonType::String) => synthesize_string(schema),
        Some(JsonType::Integer) => synthesize_number(schema, true),
        Some(JsonType::Number) => synthesize_number(schema, false),
        Some(JsonType::Boolean) => Value::Bool(true),
        Some(JsonType::Null) => Value::Null,
        _ => Value::Object(Map::new()),
    }
}

/// Shallow-merge every object branch; the schema's own properties go on top.
fn merge_all_of(schema: &Schema, depth: usize) -> Value {
    let mut merged = Map::new();
    let mut non_object = None;

    for branch in &schema.all_of {
        match synthesize_at(branch, depth + 1) {
            Value::Object(fields) => merged.extend(fields),
            other => {
                non_object.get_or_insert(other);
            }
        }
    }

    if !schema.properties.is_empty() {
        if let Value::Object(own) = synthesize_object(schema, depth) {
            merged.extend(own);
        }
    }

    match non_object {
        Some(value) if merged.is_empty() => value,
        _ => Value::Object(merged),
    }
}

fn synthesize_object(schema: &Schema, depth: usize) -> Value {
    let mut object = Map::new();

    for name in &schema.required {
        let value = match schema.properties.get(name) {
            Some(prop) => synthesize_at(prop, depth + 1),
            None => synthesize_string(&Schema::of_type(JsonType::String)),
        };
        object.insert(name.clone(), value);
    }

    let optional = schema
        .properties
        .iter()
        .filter(|(name, _)| !schema.required.contains(name))
        .take(MAX_OPTIONAL_PROPERTIES);
    for (name, prop) in optional {
        object.insert(name.clone(), synthesize_at(prop, depth + 1));
    }

    Value::Object(object)
}

fn synthesize_array(schema: &Schema, depth: usize) -> Value {
    let mut count = schema.min_items.unwrap_or(1).clamp(1, MAX_ARRAY_ITEMS);
    if let Some(max) = schema.max_items {
        count = count.min(max);
    }

    let item = match &schema.items {
        Some(items) => synthesize_at(items, depth + 1),
        None => Value::Object(Map::new()),
    };

    let unique = schema.unique_items == Some(true);
    let values = (0..count)
        .map(|i| {
            if unique && i > 0 {
                distinct_variant(&item, i)
            } else {
                item.clone()
            }
        })
        .collect();
    Value::Array(values)
}

/// Nudge a repeated item so `uniqueItems` arrays stay valid.
fn distinct_variant(value: &Value, index: u64) -> Value {
    match value {
        Value::String(s) => Value::String(format!("{}-{}", s, index)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                let step = index as i64;
                Value::from(i.checked_add(step).unwrap_or_else(|| i - step))
            }
            None => float_value(n.as_f64().unwrap_or(0.0) + index as f64),
        },
        other => other.clone(),
    }
}

fn synthesize_string(schema: &Schema) -> Value {
    if let Some(value) = schema.format.as_deref().and_then(format_example) {
        return Value::String(value.to_string());
    }

    let target = string_length(schema);
    if let Some(pattern) = &schema.pattern {
        if let Some(value) = pattern_example(pattern, target) {
            return Value::String(value);
        }
    }

    Value::String(STRING_PLACEHOLDER.chars().cycle().take(target).collect())
}

fn format_example(format: &str) -> Option<&'static str> {
    let value = match format {
        "date" => "2024-01-15",
        "date-time" => "2024-01-15T10:30:00Z",
        "time" => "10:30:00",
        "email" | "idn-email" => "user@example.com",
        "uri" | "url" | "uri-reference" | "iri" => "https://example.com",
        "uuid" => "123e4567-e89b-12d3-a456-426614174000",
        "hostname" | "idn-hostname" => "example.com",
        "ipv4" => "192.168.1.1",
        "ipv6" => "2001:db8::1",
        "byte" => "ZXhhbXBsZQ==",
        "binary" => "binary-data",
        "password" => "P@ssw0rd123!",
        "phone" => "+1-555-555-0100",
        _ => return None,
    };
    Some(value)
}

/// `minLength + 10`, capped by `maxLength`.
fn string_length(schema: &Schema) -> usize {
    let wanted = schema.min_length.unwrap_or(0) + STRING_PADDING;
    let capped = match schema.max_length {
        Some(max) => wanted.min(max),
        None => wanted,
    };
    capped as usize
}

/// Literal fallbacks for a few character-class shapes; patterns are not solved.
fn pattern_example(pattern: &str, target: usize) -> Option<String> {
    let alphabet = if pattern.contains("[0-9]") || pattern.contains(r"\d") {
        "0123456789"
    } else if pattern.contains("[A-Z]") {
        "ABCDEFGHIJKLMNOPQRSTUVWXYZ"
    } else if pattern.contains("[a-z]") {
        "abcdefghijklmnopqrstuvwxyz"
    } else {
        return None;
    };

    let length = QUANTIFIER
        .captures(pattern)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(target.max(1));

    Some(alphabet.chars().cycle().take(length).collect())
}

fn synthesize_number(schema: &Schema, integer: bool) -> Value {
    let (min, max) = effective_bounds(schema);
    let mut value = (min + max) / 2.0;

    if let Some(step) = schema.multiple_of.filter(|m| *m > 0.0) {
        value = (value / step).round() * step;
    }

    if integer {
        Value::from(value.round() as i64)
    } else {
        float_value(value)
    }
}

/// Inclusive bounds after widening exclusive ones by one unit.
fn effective_bounds(schema: &Schema) -> (f64, f64) {
    let min = lower_bound(schema);
    let max = upper_bound(schema);

    match (min, max) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) if lo > DEFAULT_MAXIMUM => (lo, lo + DEFAULT_RANGE),
        (Some(lo), None) => (lo, DEFAULT_MAXIMUM),
        (None, Some(hi)) if hi < DEFAULT_MINIMUM => (hi - DEFAULT_RANGE, hi),
        (None, Some(hi)) => (DEFAULT_MINIMUM, hi),
        (None, None) => (DEFAULT_MINIMUM, DEFAULT_MAXIMUM),
    }
}

fn lower_bound(schema: &Schema) -> Option<f64> {
    match (schema.exclusive_minimum, schema.minimum) {
        (Some(ExclusiveBound::Value(v)), _) => Some(v + 1.0),
        (Some(ExclusiveBound::Flag(true)), Some(m)) => Some(m + 1.0),
        (_, m) => m,
    }
}

fn upper_bound(schema: &Schema) -> Option<f64> {
    match (schema.exclusive_maximum, schema.maximum) {
        (Some(ExclusiveBound::Value(v)), _) => Some(v - 1.0),
        (Some(ExclusiveBound::Flag(true)), Some(m)) => Some(m - 1.0),
        (_, m) => m,
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(value: Value) -> Schema {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_priority_example_default_enum_const() {
        assert_eq!(
            synthesize(&schema(json!({"type": "string", "example": "ex", "default": "d"}))),
            json!("ex")
        );
        assert_eq!(
            synthesize(&schema(json!({"type": "string", "default": "d", "enum": ["a"]}))),
            json!("d")
        );
        assert_eq!(
            synthesize(&schema(json!({"type": "string", "enum": ["red", "blue"]}))),
            json!("red")
        );
        assert_eq!(synthesize(&schema(json!({"const": 7}))), json!(7));
    }

    #[test]
    fn test_integer_midpoint_with_exclusive_bounds() {
        let s = schema(json!({
            "type": "integer",
            "minimum": 0, "exclusiveMinimum": true,
            "maximum": 10, "exclusiveMaximum": true
        }));
        // [1, 9] → 5
        assert_eq!(synthesize(&s), json!(5));
    }

    #[test]
    fn test_number_rounds_to_multiple_of() {
        let s = schema(json!({"type": "number", "minimum": 0, "maximum": 10, "multipleOf": 4}));
        assert_eq!(synthesize(&s).as_f64(), Some(4.0));
    }

    #[test]
    fn test_number_minimum_above_default_range() {
        let s = schema(json!({"type": "integer", "minimum": 1000}));
        assert_eq!(synthesize(&s), json!(1050));
    }

    #[test]
    fn test_string_length_clamped_by_max_length() {
        let s = schema(json!({"type": "string", "minLength": 2, "maxLength": 5}));
        assert_eq!(synthesize(&s), json!("examp"));

        let unbounded = schema(json!({"type": "string"}));
        assert_eq!(synthesize(&unbounded).as_str().unwrap().len(), 10);
    }

    #[test]
    fn test_string_formats() {
        assert_eq!(
            synthesize(&schema(json!({"type": "string", "format": "email"}))),
            json!("user@example.com")
        );
        assert_eq!(
            synthesize(&schema(json!({"type": "string", "format": "uuid"}))),
            json!("123e4567-e89b-12d3-a456-426614174000")
        );
    }

    #[test]
    fn test_pattern_fallbacks() {
        assert_eq!(
            synthesize(&schema(json!({"type": "string", "pattern": "^[A-Z]{3}$"}))),
            json!("ABC")
        );
        assert_eq!(
            synthesize(&schema(json!({"type": "string", "pattern": "^\\d{5}$"}))),
            json!("01234")
        );
    }

    #[test]
    fn test_array_item_count() {
        let s = schema(json!({"type": "array", "minItems": 5, "items": {"type": "boolean"}}));
        assert_eq!(synthesize(&s), json!([true, true, true]));

        let no_min = schema(json!({"type": "array", "items": {"type": "integer"}}));
        assert_eq!(synthesize(&no_min), json!([50]));
    }

    #[test]
    fn test_unique_items_are_distinct() {
        let s = schema(json!({
            "type": "array", "minItems": 2, "uniqueItems": true,
            "items": {"type": "string", "enum": ["a"]}
        }));
        assert_eq!(synthesize(&s), json!(["a", "a-1"]));
    }

    #[test]
    fn test_unique_integers_near_i64_max_do_not_overflow() {
        let s = schema(json!({
            "type": "array",
            "minItems": 3,
            "uniqueItems": true,
            "items": {"type": "integer", "enum": [i64::MAX]}
        }));
        assert_eq!(
            synthesize(&s),
            json!([i64::MAX, i64::MAX - 1, i64::MAX - 2])
        );
    }

    #[test]
    fn test_all_of_merges_objects() {
        let s = schema(json!({
            "allOf": [
                {"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}}},
                {"type": "object", "required": ["name"], "properties": {"name": {"type": "string", "example": "n"}}}
            ]
        }));
        assert_eq!(synthesize(&s), json!({"id": 50, "name": "n"}));
    }

    #[test]
    fn test_one_of_takes_first_branch() {
        let s = schema(json!({"oneOf": [{"type": "boolean"}, {"type": "string"}]}));
        assert_eq!(synthesize(&s), json!(true));
    }

    #[test]
    fn test_untyped_empty_schema_is_empty_object() {
        assert_eq!(synthesize(&Schema::default()), json!({}));
    }
}
