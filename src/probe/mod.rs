pub mod engine;
pub mod error_quality;
pub mod request_builder;
pub mod synthesizer;
pub mod transport;
pub mod validator;

pub use engine::Prober;
pub use error_quality::{
    evaluate_error_response, ErrorQualityResult, HeuristicEvaluator, ResponseQualityEvaluator,
};
pub use request_builder::{applicable_malformations, RequestBuilder};
pub use synthesizer::synthesize;
pub use transport::{RateLimiter, TransportClient};
pub use validator::{validate_schema, SchemaValidation, SchemaViolation};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::openapi::HttpMethod;

const PREVIEW_CHARS: usize = 200;

// ============================================================================
// Requests
// ============================================================================

/// A deliberate violation of an operation's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformationKind {
    InvalidJson,
    MissingRequired,
    NullRequired,
    WrongType,
    ExtraField,
    MissingAuth,
    EmptyBody,
}

impl MalformationKind {
    /// Execution order within one endpoint probe.
    pub const ALL: [MalformationKind; 7] = [
        MalformationKind::InvalidJson,
        MalformationKind::MissingRequired,
        MalformationKind::NullRequired,
        MalformationKind::WrongType,
        MalformationKind::ExtraField,
        MalformationKind::MissingAuth,
        MalformationKind::EmptyBody,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MalformationKind::InvalidJson => "invalid-json",
            MalformationKind::MissingRequired => "missing-required",
            MalformationKind::NullRequired => "null-required",
            MalformationKind::WrongType => "wrong-type",
            MalformationKind::ExtraField => "extra-field",
            MalformationKind::MissingAuth => "missing-auth",
            MalformationKind::EmptyBody => "empty-body",
        }
    }

    /// Status codes a well-behaved API answers with.
    pub fn expected_statuses(&self) -> &'static [u16] {
        match self {
            MalformationKind::InvalidJson => &[400],
            MalformationKind::MissingAuth => &[401, 403],
            MalformationKind::MissingRequired
            | MalformationKind::NullRequired
            | MalformationKind::WrongType
            | MalformationKind::ExtraField
            | MalformationKind::EmptyBody => &[400, 422],
        }
    }
}

impl std::fmt::Display for MalformationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ProbeBody {
    Json(Value),
    /// Sent verbatim; used for payloads that must not parse.
    Raw(String),
}

impl ProbeBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ProbeBody::Json(v) => Some(v),
            ProbeBody::Raw(_) => None,
        }
    }

    pub fn to_payload(&self) -> String {
        match self {
            ProbeBody::Json(v) => v.to_string(),
            ProbeBody::Raw(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub method: HttpMethod,
    /// Target URL with path parameters substituted and no query string.
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<ProbeBody>,
    /// `None` for the valid baseline.
    pub malformation: Option<MalformationKind>,
}

impl ProbeRequest {
    pub fn omits_auth(&self) -> bool {
        self.malformation == Some(MalformationKind::MissingAuth)
    }

    pub fn json_body(&self) -> Option<&Value> {
        self.body.as_ref().and_then(ProbeBody::as_json)
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            method: self.method,
            url: self.url.clone(),
            query: self.query.clone(),
            body_preview: self.body.as_ref().map(|b| preview(&b.to_payload())),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

impl ResponseBody {
    /// JSON when the payload parses, raw text otherwise.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return ResponseBody::Empty;
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }

    fn preview(&self) -> Option<String> {
        match self {
            ResponseBody::Empty => None,
            ResponseBody::Json(v) => Some(preview(&v.to_string())),
            ResponseBody::Text(t) => Some(preview(t)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

/// Terminal outcome of one logical send, including every failure mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// `None` when no HTTP response was ever received.
    pub status: Option<u16>,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
    pub latency_ms: f64,
    pub timed_out: bool,
    pub error: Option<TransportError>,
    pub attempts: u32,
}

impl ProbeResponse {
    pub fn transport_failure(error: TransportError, latency_ms: f64, attempts: u32) -> Self {
        Self {
            status: None,
            headers: BTreeMap::new(),
            body: ResponseBody::Empty,
            latency_ms,
            timed_out: error.kind == TransportErrorKind::Timeout,
            error: Some(error),
            attempts,
        }
    }

    pub fn reached(&self) -> bool {
        self.status.is_some()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s))
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(s) if (400..500).contains(&s))
    }

    pub fn summary(&self) -> ResponseSummary {
        ResponseSummary {
            status: self.status,
            latency_ms: self.latency_ms,
            timed_out: self.timed_out,
            error: self.error.as_ref().map(|e| e.message.clone()),
            body_preview: self.body.preview(),
        }
    }

    /// Human-readable outcome, e.g. `HTTP 422` or `timed out`.
    pub fn describe(&self) -> String {
        match (self.status, &self.error) {
            (Some(status), _) => format!("HTTP {}", status),
            (None, Some(e)) if e.kind == TransportErrorKind::Timeout => "timed out".to_string(),
            (None, Some(e)) => format!("no response ({})", e.message),
            (None, None) => "no response".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body_preview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSummary {
    pub status: Option<u16>,
    pub latency_ms: f64,
    pub timed_out: bool,
    pub error: Option<String>,
    pub body_preview: Option<String>,
}

/// Baseline outcome for checks that only ask "did this succeed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveResponse {
    pub status: u16,
    pub body: ResponseBody,
    pub headers: BTreeMap<String, String>,
    pub latency_ms: f64,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformationResult {
    pub passed: bool,
    pub score: u8,
    pub expected_behavior: String,
    pub actual_behavior: String,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub request: ProbeRequest,
    pub response: ProbeResponse,
    /// Baseline only: check against the matching declared response schema.
    pub schema_validation: Option<SchemaValidation>,
    /// Malformations only.
    pub evaluation: Option<MalformationResult>,
    pub error_quality: Option<ErrorQualityResult>,
}

impl ProbeResult {
    pub fn test_name(&self) -> &'static str {
        self.request
            .malformation
            .map(|k| k.as_str())
            .unwrap_or("baseline")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub reachable: bool,
    pub baseline_passed: bool,
    /// `None` when no response schema was declared for the baseline status.
    pub schema_valid: Option<bool>,
    pub avg_error_handling_score: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub malformations_run: usize,
    pub malformations_passed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointProbeReport {
    pub operation: String,
    pub operation_id: Option<String>,
    pub baseline: ProbeResult,
    pub malformations: Vec<ProbeResult>,
    /// Why malformation testing was not attempted, if it wasn't.
    pub malformations_skipped: Option<String>,
    pub summary: EndpointSummary,
}

/// One malformation probe, flattened for rule checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalformationTestResult {
    pub operation: String,
    pub test_type: MalformationKind,
    pub request: RequestSummary,
    pub response: ResponseSummary,
    pub evaluation: MalformationResult,
    pub error_quality: Option<ErrorQualityResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub endpoints: usize,
    pub endpoints_reachable: usize,
    pub baseline_passed: usize,
    pub malformations_total: usize,
    pub malformations_passed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRunReport {
    pub base_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub endpoints: Vec<EndpointProbeReport>,
}

impl ProbeRunReport {
    pub fn malformation_tests(&self) -> Vec<MalformationTestResult> {
        self.endpoints
            .iter()
            .flat_map(|endpoint| {
                endpoint.malformations.iter().filter_map(move |result| {
                    let kind = result.request.malformation?;
                    let evaluation = result.evaluation.clone()?;
                    Some(MalformationTestResult {
                        operation: endpoint.operation.clone(),
                        test_type: kind,
                        request: result.request.summary(),
                        response: result.response.summary(),
                        evaluation,
                        error_quality: result.error_quality.clone(),
                    })
                })
            })
            .collect()
    }

    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals {
            endpoints: self.endpoints.len(),
            ..Default::default()
        };
        for endpoint in &self.endpoints {
            let s = &endpoint.summary;
            totals.endpoints_reachable += s.reachable as usize;
            totals.baseline_passed += s.baseline_passed as usize;
            totals.malformations_total += s.malformations_run;
            totals.malformations_passed += s.malformations_passed;
        }
        totals
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
        cut.push('…');
        cut
    }
}
