use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON Schema primitive type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Null => "null",
        }
    }

    /// Type of an existing JSON value. Integers report as `Integer`.
    pub fn of(value: &Value) -> JsonType {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => JsonType::Integer,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }
}

/// `type` is a single name in OpenAPI 3.0 and may be a list in 3.1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeDecl {
    Single(JsonType),
    Multiple(Vec<JsonType>),
}

impl TypeDecl {
    /// First declared non-null type.
    pub fn primary(&self) -> Option<JsonType> {
        match self {
            TypeDecl::Single(JsonType::Null) => None,
            TypeDecl::Single(t) => Some(*t),
            TypeDecl::Multiple(types) => types.iter().copied().find(|t| *t != JsonType::Null),
        }
    }

    pub fn allows_null(&self) -> bool {
        match self {
            TypeDecl::Single(t) => *t == JsonType::Null,
            TypeDecl::Multiple(types) => types.contains(&JsonType::Null),
        }
    }
}

/// OpenAPI 3.0 writes `exclusiveMinimum: true` next to `minimum`; 3.1 writes the bound itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExclusiveBound {
    Flag(bool),
    Value(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<Schema>),
}

/// Pre-dereferenced schema as handed over by the normalization layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<TypeDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(rename = "const", default, skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<ExclusiveBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<ExclusiveBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<Schema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    /// Keywords not modeled above (`not`, `minProperties`, `prefixItems`, ...). Kept so
    /// validation sees the full schema.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Schema {
    pub fn of_type(t: JsonType) -> Self {
        Schema {
            schema_type: Some(TypeDecl::Single(t)),
            ..Default::default()
        }
    }

    pub fn primary_type(&self) -> Option<JsonType> {
        self.schema_type.as_ref().and_then(TypeDecl::primary)
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable == Some(true)
            || self
                .schema_type
                .as_ref()
                .map(TypeDecl::allows_null)
                .unwrap_or(false)
    }

    /// Untyped schemas that declare properties are treated as objects.
    pub fn describes_object(&self) -> bool {
        self.primary_type() == Some(JsonType::Object)
            || (self.schema_type.is_none() && !self.properties.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_array_picks_first_non_null() {
        let schema: Schema = serde_json::from_value(json!({"type": ["null", "integer"]})).unwrap();
        assert_eq!(schema.primary_type(), Some(JsonType::Integer));
        assert!(schema.is_nullable());
    }

    #[test]
    fn test_boolean_and_numeric_exclusive_bounds_parse() {
        let old: Schema =
            serde_json::from_value(json!({"minimum": 1, "exclusiveMinimum": true})).unwrap();
        let new: Schema = serde_json::from_value(json!({"exclusiveMinimum": 1.5})).unwrap();
        assert_eq!(old.exclusive_minimum, Some(ExclusiveBound::Flag(true)));
        assert_eq!(new.exclusive_minimum, Some(ExclusiveBound::Value(1.5)));
    }

    #[test]
    fn test_properties_keep_declaration_order() {
        let schema: Schema = serde_json::from_value(json!({
            "type": "object",
            "properties": {"zeta": {"type": "string"}, "alpha": {"type": "string"}}
        }))
        .unwrap();
        let keys: Vec<&str> = schema.properties.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_unmodeled_keywords_survive_round_trip() {
        let source = json!({
            "type": "object",
            "maxProperties": 2,
            "not": {"required": ["legacy"]},
            "patternProperties": {"^x-": {"type": "string"}}
        });
        let schema: Schema = serde_json::from_value(source.clone()).unwrap();
        assert_eq!(schema.primary_type(), Some(JsonType::Object));
        assert_eq!(schema.extra.len(), 3);
        assert!(!schema.extra.contains_key("type"));
        assert_eq!(serde_json::to_value(&schema).unwrap(), source);
    }
}
