pub mod schema;

pub use schema::{AdditionalProperties, ExclusiveBound, JsonType, Schema, TypeDecl};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::ProbeError;

// ============================================================================
// Normalized API model (produced upstream, read-only here)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedApi {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// First server URL of the document, if it declared one.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
}

impl NormalizedApi {
    pub fn from_json_str(json: &str) -> Result<Self, ProbeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProbeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// `title version`, or a placeholder when the document is anonymous.
    pub fn label(&self) -> String {
        match (&self.title, &self.version) {
            (Some(title), Some(version)) => format!("{} {}", title, version),
            (Some(title), None) => title.clone(),
            _ => "unnamed API".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "options")]
    Options,
    #[serde(alias = "trace")]
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Methods whose malformation probes could destroy or overwrite data.
    pub fn is_unsafe(&self) -> bool {
        matches!(self, HttpMethod::Delete | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Trace => reqwest::Method::TRACE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub example: Option<Value>,
}

impl Parameter {
    pub fn has_default(&self) -> bool {
        self.schema
            .as_ref()
            .map(|s| s.default.is_some())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaType {
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub example: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBodySpec {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub content: IndexMap<String, MediaType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: IndexMap<String, MediaType>,
}

/// Scheme name → scopes. An empty requirement means "anonymous allowed".
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    #[serde(default)]
    pub operation_id: Option<String>,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub request_body: Option<RequestBodySpec>,
    /// Keyed by status code, status class (`4XX`) or `default`.
    #[serde(default)]
    pub responses: IndexMap<String, ResponseSpec>,
    #[serde(default)]
    pub security: Vec<SecurityRequirement>,
}

impl OperationDescriptor {
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn parameters_in(&self, location: ParameterLocation) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(move |p| p.location == location)
    }

    /// The JSON media type of the request body, if any.
    pub fn json_body(&self) -> Option<&MediaType> {
        self.request_body.as_ref().and_then(|b| json_media(&b.content))
    }

    pub fn json_body_schema(&self) -> Option<&Schema> {
        self.json_body().and_then(|m| m.schema.as_ref())
    }

    pub fn has_request_body(&self) -> bool {
        self.json_body().is_some()
    }

    pub fn request_body_required(&self) -> bool {
        self.request_body.as_ref().map(|b| b.required).unwrap_or(false)
    }

    pub fn body_required_fields(&self) -> &[String] {
        self.json_body_schema()
            .map(|s| s.required.as_slice())
            .unwrap_or(&[])
    }

    pub fn requires_auth(&self) -> bool {
        self.security.iter().any(|req| !req.is_empty())
    }

    /// Response schema for `status`: exact code, then status class (`4XX`), then `default`.
    pub fn response_schema_for(&self, status: u16) -> Option<&Schema> {
        let exact = status.to_string();
        let class = format!("{}XX", status / 100);

        let response = self
            .responses
            .get(&exact)
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(&class))
                    .map(|(_, r)| r)
            })
            .or_else(|| self.responses.get("default"))?;

        json_media(&response.content).and_then(|m| m.schema.as_ref())
    }
}

/// `application/json` first, otherwise the first media type mentioning json.
fn json_media(content: &IndexMap<String, MediaType>) -> Option<&MediaType> {
    content.get("application/json").or_else(|| {
        content
            .iter()
            .find(|(name, _)| name.contains("json"))
            .map(|(_, m)| m)
    })
}
