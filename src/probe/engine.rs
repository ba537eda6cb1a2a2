use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::error_quality::{ErrorQualityResult, HeuristicEvaluator, ResponseQualityEvaluator};
use super::request_builder::{applicable_malformations, RequestBuilder};
use super::transport::TransportClient;
use super::validator::{validate_schema, SchemaValidation};
use super::{
    EndpointProbeReport, EndpointSummary, LiveResponse, MalformationKind, MalformationResult,
    ProbeRequest, ProbeResponse, ProbeResult, ProbeRunReport, ResponseBody, TransportError,
    TransportErrorKind,
};
use crate::config::ProberConfig;
use crate::error::ProbeError;
use crate::openapi::{NormalizedApi, OperationDescriptor};

const EXACT_STATUS_POINTS: f64 = 40.0;
const ANY_CLIENT_ERROR_POINTS: f64 = 20.0;
const ERROR_QUALITY_WEIGHT: f64 = 0.6;
const PASS_THRESHOLD: u8 = 60;
const LATENCY_PERCENTILE: f64 = 0.95;

/// Drives baseline and malformation probes for operations.
///
/// Operations, and the probes within one operation, run strictly one after another:
/// the transport's rate limiter assumes a single writer and progress counts must be
/// monotonic. A concurrent caller has to keep that single-writer pacing intact.
pub struct Prober {
    builder: RequestBuilder,
    transport: TransportClient,
    evaluator: Arc<dyn ResponseQualityEvaluator>,
    sandbox: bool,
    include_malformations: bool,
}

impl Prober {
    pub fn new(config: ProberConfig) -> Result<Self, ProbeError> {
        let builder = RequestBuilder::new(&config.base_url)?;
        let transport = TransportClient::new(config.transport, config.auth)?;

        Ok(Self {
            builder,
            transport,
            evaluator: Arc::new(HeuristicEvaluator),
            sandbox: config.sandbox,
            include_malformations: config.include_malformations,
        })
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ResponseQualityEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// Probe every operation in order, reporting `(completed, total)` after each one.
    pub async fn probe_all(
        &self,
        api: &NormalizedApi,
        mut on_progress: impl FnMut(usize, usize),
    ) -> ProbeRunReport {
        let started_at = Utc::now();
        let total = api.operations.len();
        info!(
            "Probe run started: base_url={}, operations={}",
            self.builder.base_url(),
            total
        );

        let mut endpoints = Vec::with_capacity(total);
        for (i, op) in api.operations.iter().enumerate() {
            info!("Probing {}/{}: {}", i + 1, total, op.label());
            endpoints.push(self.probe_endpoint(op).await);
            on_progress(i + 1, total);
        }

        let report = ProbeRunReport {
            base_url: self.builder.base_url().to_string(),
            started_at,
            finished_at: Utc::now(),
            endpoints,
        };
        let totals = report.totals();
        info!(
            "Probe run completed: reachable={}/{}, baselines passed={}, malformations passed={}/{}",
            totals.endpoints_reachable,
            totals.endpoints,
            totals.baseline_passed,
            totals.malformations_passed,
            totals.malformations_total
        );
        report
    }

    /// PLAN → BASELINE → MALFORMATIONS → SUMMARIZE for one operation.
    pub async fn probe_endpoint(&self, op: &OperationDescriptor) -> EndpointProbeReport {
        let plan = self.plan_malformations(op);

        let baseline = self.run_baseline(op).await;
        if !baseline.response.reached() {
            warn!(
                "{} baseline unreachable: {}",
                op.label(),
                baseline.response.describe()
            );
        }

        let mut malformations = Vec::new();
        if let Ok(kinds) = &plan {
            for kind in kinds {
                match self.run_malformation(op, *kind).await {
                    Ok(result) => malformations.push(result),
                    Err(e) => warn!("{} {} probe dropped: {}", op.label(), kind, e),
                }
            }
        }

        let summary = summarize(&baseline, &malformations);
        info!(
            "  {}: reachable={}, baseline={}, malformations passed={}/{}",
            op.label(),
            summary.reachable,
            baseline.response.describe(),
            summary.malformations_passed,
            summary.malformations_run
        );

        EndpointProbeReport {
            operation: op.label(),
            operation_id: op.operation_id.clone(),
            baseline,
            malformations,
            malformations_skipped: plan.err(),
            summary,
        }
    }

    /// Send only the baseline request; `None` when the server never answered.
    pub async fn get_live_response(&self, op: &OperationDescriptor) -> Option<LiveResponse> {
        let request = match self.builder.build_valid_request(op) {
            Ok(r) => r,
            Err(e) => {
                warn!("Could not build request for {}: {}", op.label(), e);
                return None;
            }
        };
        let response = self.transport.send(&request).await;
        Some(LiveResponse {
            status: response.status?,
            body: response.body,
            headers: response.headers,
            latency_ms: response.latency_ms,
        })
    }

    /// Which malformations to run, or why none will be.
    fn plan_malformations(&self, op: &OperationDescriptor) -> Result<Vec<MalformationKind>, String> {
        if !self.include_malformations {
            return Err("malformation testing disabled".to_string());
        }
        if op.method.is_unsafe() && !self.sandbox && !op.has_request_body() {
            return Err(format!(
                "{} without a request body is only malformed in sandbox mode",
                op.method
            ));
        }
        Ok(applicable_malformations(op))
    }

    async fn run_baseline(&self, op: &OperationDescriptor) -> ProbeResult {
        let request = match self.builder.build_valid_request(op) {
            Ok(r) => r,
            Err(e) => {
                warn!("Could not build baseline request for {}: {}", op.label(), e);
                return unbuilt_baseline(op, &e);
            }
        };

        let response = self.transport.send(&request).await;
        let schema_validation = validate_against_declared(op, &response);

        ProbeResult {
            request,
            response,
            schema_validation,
            evaluation: None,
            error_quality: None,
        }
    }

    async fn run_malformation(
        &self,
        op: &OperationDescriptor,
        kind: MalformationKind,
    ) -> Result<ProbeResult, ProbeError> {
        let request = self.builder.build_malformed_request(op, kind)?;
        let response = self.transport.send(&request).await;

        let error_quality = match response.status {
            Some(status) if status >= 400 => Some(self.evaluator.evaluate(&response)),
            _ => None,
        };
        let evaluation = score_malformation(kind, &response, error_quality.as_ref());

        Ok(ProbeResult {
            request,
            response,
            schema_validation: None,
            evaluation: Some(evaluation),
            error_quality,
        })
    }
}

/// Baseline placeholder when the request could not even be assembled.
fn unbuilt_baseline(op: &OperationDescriptor, error: &ProbeError) -> ProbeResult {
    ProbeResult {
        request: ProbeRequest {
            method: op.method,
            url: op.path.clone(),
            headers: Default::default(),
            query: Vec::new(),
            body: None,
            malformation: None,
        },
        response: ProbeResponse::transport_failure(
            TransportError {
                kind: TransportErrorKind::Other,
                message: error.to_string(),
            },
            0.0,
            0,
        ),
        schema_validation: None,
        evaluation: None,
        error_quality: None,
    }
}

/// Check the body against the response schema declared for the received status.
fn validate_against_declared(
    op: &OperationDescriptor,
    response: &ProbeResponse,
) -> Option<SchemaValidation> {
    let schema = op.response_schema_for(response.status?)?;
    let validation = match &response.body {
        ResponseBody::Json(body) => validate_schema(body, schema),
        ResponseBody::Empty => {
            SchemaValidation::failed("body", "A JSON body was declared but the response was empty")
        }
        ResponseBody::Text(_) => {
            SchemaValidation::failed("body", "A JSON body was declared but the response is not JSON")
        }
    };
    Some(validation)
}

/// 40 for the expected status, 20 for any other 4xx, plus 60% of the error quality
/// score for error statuses. Passing needs 60.
pub fn score_malformation(
    kind: MalformationKind,
    response: &ProbeResponse,
    quality: Option<&ErrorQualityResult>,
) -> MalformationResult {
    let expected = kind.expected_statuses();
    let expected_behavior = format!(
        "HTTP {}",
        expected
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(" or ")
    );

    let status_points = match response.status {
        Some(status) if expected.contains(&status) => EXACT_STATUS_POINTS,
        Some(status) if (400..500).contains(&status) => ANY_CLIENT_ERROR_POINTS,
        _ => 0.0,
    };
    let quality_points = match (response.status, quality) {
        (Some(status), Some(q)) if status >= 400 => q.score as f64 * ERROR_QUALITY_WEIGHT,
        _ => 0.0,
    };
    let score = (status_points + quality_points).round().clamp(0.0, 100.0) as u8;

    let mut feedback = status_feedback(kind, response, &expected_behavior);
    if let Some(q) = quality {
        feedback.push_str(&format!(" Error quality {}/100.", q.score));
        if let Some(first) = q.feedback.first() {
            feedback.push(' ');
            feedback.push_str(first);
            feedback.push('.');
        }
    }

    MalformationResult {
        passed: score >= PASS_THRESHOLD,
        score,
        expected_behavior,
        actual_behavior: response.describe(),
        feedback,
    }
}

fn status_feedback(kind: MalformationKind, response: &ProbeResponse, expected: &str) -> String {
    match response.status {
        Some(status) if kind.expected_statuses().contains(&status) => {
            format!("Rejected the {} request with HTTP {} as expected.", kind, status)
        }
        Some(status) if (400..500).contains(&status) => format!(
            "Rejected the {} request with HTTP {}; {} would be more precise.",
            kind, status, expected
        ),
        Some(status) if (200..300).contains(&status) && kind == MalformationKind::MissingAuth => {
            format!(
                "Endpoint accepted an unauthenticated request (HTTP {}); expected {}.",
                status, expected
            )
        }
        Some(status) if status < 400 => format!(
            "Accepted the {} request with HTTP {} instead of rejecting it.",
            kind, status
        ),
        Some(status) => format!(
            "Failed with HTTP {} instead of reporting a client error.",
            status
        ),
        None => format!("No usable response: {}.", response.describe()),
    }
}

fn summarize(baseline: &ProbeResult, malformations: &[ProbeResult]) -> EndpointSummary {
    let scores: Vec<f64> = malformations
        .iter()
        .filter_map(|m| m.evaluation.as_ref())
        .map(|e| e.score as f64)
        .collect();
    let passed = malformations
        .iter()
        .filter_map(|m| m.evaluation.as_ref())
        .filter(|e| e.passed)
        .count();

    let mut latencies: Vec<f64> = std::iter::once(baseline)
        .chain(malformations)
        .filter(|r| r.response.reached())
        .map(|r| r.response.latency_ms)
        .collect();
    latencies.sort_by(f64::total_cmp);

    EndpointSummary {
        reachable: baseline.response.reached(),
        baseline_passed: baseline.response.is_success(),
        schema_valid: baseline.schema_validation.as_ref().map(|v| v.valid),
        avg_error_handling_score: mean(&scores),
        avg_latency_ms: mean(&latencies),
        p95_latency_ms: percentile(&latencies, LATENCY_PERCENTILE),
        malformations_run: malformations.len(),
        malformations_passed: passed,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}
