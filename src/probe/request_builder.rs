use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use super::synthesizer::synthesize;
use super::{MalformationKind, ProbeBody, ProbeRequest};
use crate::error::ProbeError;
use crate::openapi::{JsonType, OperationDescriptor, Parameter, ParameterLocation, Schema};

pub const EXTRA_FIELD_NAME: &str = "__probe_unexpected_field";
pub const EXTRA_FIELD_VALUE: &str = "this field is not part of the schema";
/// Deliberately unterminated: must never parse as JSON.
pub const INVALID_JSON_PAYLOAD: &str = r#"{"invalid": json, "missing": "quote}"#;

const JSON_CONTENT_TYPE: &str = "application/json";

static PATH_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}/]+)\}").expect("valid placeholder regex"));

/// Builds baseline and malformed requests for operations against one server.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: Url,
}

impl RequestBuilder {
    pub fn new(base_url: &str) -> Result<Self, ProbeError> {
        let base_url =
            Url::parse(base_url).map_err(|_| ProbeError::InvalidBaseUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ProbeError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Minimal valid request: path params, required/defaulted query params, required
    /// headers and cookies, and a JSON body when the operation takes one.
    pub fn build_valid_request(&self, op: &OperationDescriptor) -> Result<ProbeRequest, ProbeError> {
        let url = self.target_url(op)?;

        let query = op
            .parameters_in(ParameterLocation::Query)
            .filter(|p| p.required || p.has_default())
            .map(|p| (p.name.clone(), param_string(p)))
            .collect();

        let mut headers = IndexMap::new();
        headers.insert("Accept".to_string(), JSON_CONTENT_TYPE.to_string());
        for param in op
            .parameters_in(ParameterLocation::Header)
            .filter(|p| p.required)
        {
            headers.insert(param.name.clone(), param_string(param));
        }

        let cookies: Vec<String> = op
            .parameters_in(ParameterLocation::Cookie)
            .filter(|p| p.required)
            .map(|p| format!("{}={}", p.name, param_string(p)))
            .collect();
        if !cookies.is_empty() {
            headers.insert("Cookie".to_string(), cookies.join("; "));
        }

        let body = op.json_body().map(|media| {
            let value = match (&media.example, &media.schema) {
                (Some(example), _) => example.clone(),
                (None, Some(schema)) => synthesize(schema),
                (None, None) => Value::Object(Map::new()),
            };
            ProbeBody::Json(value)
        });
        if body.is_some() {
            headers.insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());
        }

        debug!("Built baseline request for {}: {}", op.label(), url);

        Ok(ProbeRequest {
            method: op.method,
            url: url.to_string(),
            headers,
            query,
            body,
            malformation: None,
        })
    }

    /// A fresh valid request with exactly one malformation applied.
    pub fn build_malformed_request(
        &self,
        op: &OperationDescriptor,
        kind: MalformationKind,
    ) -> Result<ProbeRequest, ProbeError> {
        let baseline = self.build_valid_request(op)?;
        Ok(malform(&baseline, op, kind))
    }

    fn target_url(&self, op: &OperationDescriptor) -> Result<Url, ProbeError> {
        let segments: Vec<String> = op
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| substitute_path_params(segment, op))
            .collect();

        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ProbeError::InvalidBaseUrl(self.base_url.to_string()))?;
            path.pop_if_empty().extend(&segments);
            if op.path.ends_with('/') && !segments.is_empty() {
                path.push("");
            }
        }
        Ok(url)
    }
}

/// Derive a malformed variant from `baseline`. The baseline itself is never touched.
pub fn malform(
    baseline: &ProbeRequest,
    op: &OperationDescriptor,
    kind: MalformationKind,
) -> ProbeRequest {
    let mut request = baseline.clone();
    request.malformation = Some(kind);

    let first_required = op.body_required_fields().first();

    match kind {
        MalformationKind::InvalidJson => {
            request.body = Some(ProbeBody::Raw(INVALID_JSON_PAYLOAD.to_string()));
            set_json_content_type(&mut request);
        }
        MalformationKind::MissingRequired => {
            if let (Some(field), Some(object)) = (first_required, body_object(&mut request)) {
                object.remove(field);
            }
        }
        MalformationKind::NullRequired => {
            if let (Some(field), Some(object)) = (first_required, body_object(&mut request)) {
                object.insert(field.clone(), Value::Null);
            }
        }
        MalformationKind::WrongType => {
            if let Some(schema) = op.json_body_schema() {
                if let Some(object) = body_object(&mut request) {
                    swap_first_field_type(object, schema);
                }
            }
        }
        MalformationKind::ExtraField => {
            match body_object(&mut request) {
                Some(object) => {
                    object.insert(EXTRA_FIELD_NAME.to_string(), json!(EXTRA_FIELD_VALUE));
                }
                None => {
                    let mut only_extra = Map::new();
                    only_extra.insert(EXTRA_FIELD_NAME.to_string(), json!(EXTRA_FIELD_VALUE));
                    request.body = Some(ProbeBody::Json(Value::Object(only_extra)));
                }
            }
            set_json_content_type(&mut request);
        }
        // Credentials are attached by the transport, which honours the tag.
        MalformationKind::MissingAuth => {}
        MalformationKind::EmptyBody => {
            request.body = None;
        }
    }

    debug!("Derived {} request for {}", kind, op.label());
    request
}

/// Which malformations make sense for this operation, in execution order.
pub fn applicable_malformations(op: &OperationDescriptor) -> Vec<MalformationKind> {
    let has_body = op.has_request_body();
    let has_required = !op.body_required_fields().is_empty();

    MalformationKind::ALL
        .into_iter()
        .filter(|kind| match kind {
            MalformationKind::MissingAuth => op.requires_auth(),
            MalformationKind::InvalidJson
            | MalformationKind::ExtraField
            | MalformationKind::WrongType => has_body,
            MalformationKind::MissingRequired | MalformationKind::NullRequired => {
                has_body && has_required
            }
            MalformationKind::EmptyBody => {
                has_body && (has_required || op.request_body_required())
            }
        })
        .collect()
}

fn body_object(request: &mut ProbeRequest) -> Option<&mut Map<String, Value>> {
    match request.body.as_mut() {
        Some(ProbeBody::Json(Value::Object(object))) => Some(object),
        _ => None,
    }
}

fn set_json_content_type(request: &mut ProbeRequest) {
    request
        .headers
        .insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());
}

/// Replace the first field that is both present and declared with an incompatible value.
fn swap_first_field_type(object: &mut Map<String, Value>, schema: &Schema) {
    for (name, prop) in &schema.properties {
        if let Some(current) = object.get_mut(name) {
            let declared = prop.primary_type().unwrap_or_else(|| JsonType::of(current));
            *current = incompatible_value(declared);
            return;
        }
    }
}

fn incompatible_value(declared: JsonType) -> Value {
    match declared {
        JsonType::String | JsonType::Null => json!(12345),
        JsonType::Integer | JsonType::Number => json!("not-a-number"),
        JsonType::Boolean => json!("not-a-boolean"),
        JsonType::Array => json!({ "unexpected": "object" }),
        JsonType::Object => json!(["unexpected", "array"]),
    }
}

fn substitute_path_params(segment: &str, op: &OperationDescriptor) -> String {
    PATH_PLACEHOLDER
        .replace_all(segment, |caps: &Captures| {
            let name = &caps[1];
            match op
                .parameters_in(ParameterLocation::Path)
                .find(|p| p.name == name)
            {
                Some(param) => param_string(param),
                None => {
                    warn!(
                        "{} has no declared path parameter '{}', using a placeholder",
                        op.label(),
                        name
                    );
                    value_string(&synthesize(&Schema::of_type(JsonType::String)))
                }
            }
        })
        .into_owned()
}

fn param_string(param: &Parameter) -> String {
    let value = match (&param.example, &param.schema) {
        (Some(example), _) => example.clone(),
        (None, Some(schema)) => synthesize(schema),
        (None, None) => synthesize(&Schema::of_type(JsonType::String)),
    };
    value_string(&value)
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_string).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(value: Value) -> OperationDescriptor {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_path_params_are_substituted_and_encoded() {
        let op = operation(json!({
            "method": "GET",
            "path": "/users/{userId}/files/{name}",
            "parameters": [
                {"name": "userId", "in": "path", "required": true, "schema": {"type": "integer", "minimum": 1, "maximum": 9}},
                {"name": "name", "in": "path", "required": true, "example": "a b"}
            ]
        }));
        let builder = RequestBuilder::new("http://localhost:8080/api").unwrap();
        let request = builder.build_valid_request(&op).unwrap();
        assert_eq!(request.url, "http://localhost:8080/api/users/5/files/a%20b");
    }

    #[test]
    fn test_optional_query_params_are_left_out() {
        let op = operation(json!({
            "method": "GET",
            "path": "/items",
            "parameters": [
                {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 20}},
                {"name": "cursor", "in": "query", "schema": {"type": "string"}},
                {"name": "tenant", "in": "query", "required": true, "schema": {"type": "string", "enum": ["acme"]}}
            ]
        }));
        let builder = RequestBuilder::new("http://localhost").unwrap();
        let request = builder.build_valid_request(&op).unwrap();
        assert_eq!(
            request.query,
            vec![
                ("limit".to_string(), "20".to_string()),
                ("tenant".to_string(), "acme".to_string())
            ]
        );
        assert!(request.body.is_none());
        assert!(!request.headers.contains_key("Content-Type"));
    }

    #[test]
    fn test_media_example_preferred_over_synthesis() {
        let op = operation(json!({
            "method": "POST",
            "path": "/pets",
            "requestBody": {"content": {"application/json": {
                "example": {"name": "Rex"},
                "schema": {"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}}
            }}}
        }));
        let builder = RequestBuilder::new("http://localhost").unwrap();
        let request = builder.build_valid_request(&op).unwrap();
        assert_eq!(request.json_body(), Some(&json!({"name": "Rex"})));
    }

    #[test]
    fn test_unknown_placeholder_still_builds() {
        let op = operation(json!({"method": "GET", "path": "/things/{missing}"}));
        let builder = RequestBuilder::new("http://localhost").unwrap();
        let request = builder.build_valid_request(&op).unwrap();
        assert_eq!(request.url, "http://localhost/things/exampleexa");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            RequestBuilder::new("not a url"),
            Err(ProbeError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            RequestBuilder::new("mailto:someone@example.com"),
            Err(ProbeError::InvalidBaseUrl(_))
        ));
    }
}
