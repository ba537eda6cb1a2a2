use conformance_prober::probe::{
    evaluate_error_response, HeuristicEvaluator, ProbeResponse, ResponseBody,
    ResponseQualityEvaluator,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn response(status: u16, body: Value) -> ProbeResponse {
    ProbeResponse {
        status: Some(status),
        headers: BTreeMap::new(),
        body: ResponseBody::Json(body),
        latency_ms: 12.0,
        timed_out: false,
        error: None,
        attempts: 1,
    }
}

#[test]
fn test_bare_generic_message_scores_low() {
    let result = evaluate_error_response(&response(400, json!({"message": "Error"})));
    assert!(result.has_message);
    assert!(!result.has_error_code);
    assert!(!result.message_is_helpful);
    assert!(!result.identifies_field);
    assert_eq!(result.score, 15);
    assert_eq!(result.feedback.len(), 5);
}

#[test]
fn test_structured_validation_error_scores_high() {
    let body = json!({
        "code": "VALIDATION_ERROR",
        "message": "Field 'email' must be a valid email address",
        "details": [{"field": "email"}]
    });
    let result = evaluate_error_response(&response(422, body));
    assert!(result.has_error_code);
    assert!(result.message_is_helpful);
    assert!(result.identifies_field);
    assert!(result.suggests_fix);
    assert!(!result.has_doc_link);
    assert_eq!(result.score, 90);
}

#[test]
fn test_nested_error_envelope_with_docs() {
    let body = json!({
        "error": {
            "type": "invalid_request_error",
            "message": "Missing required param: amount.",
            "param": "amount",
            "doc_url": "https://docs.example.com/errors/missing"
        }
    });
    let result = evaluate_error_response(&response(400, body));
    assert!(result.has_error_code);
    assert!(result.has_message);
    assert!(result.identifies_field);
    assert!(result.has_doc_link);
    assert_eq!(result.score, 100);
    assert!(result.feedback.is_empty());
}

#[test]
fn test_dated_example_does_not_count_as_field() {
    let body = json!({"code": "BAD_DATE", "message": "use ISO dates, e.g. 2024-01-01"});
    let result = evaluate_error_response(&response(400, body));
    assert!(!result.identifies_field);
    assert!(result.suggests_fix);
}

#[test]
fn test_error_list_names_field() {
    let body = json!({
        "detail": [{"loc": ["body", "amount"], "msg": "field required", "type": "value_error.missing"}]
    });
    let result = evaluate_error_response(&response(422, body));
    assert!(result.identifies_field);
    assert!(!result.has_message);
}

#[test]
fn test_field_attribution_not_demanded_outside_validation_statuses() {
    let body = json!({"code": "INTERNAL", "message": "Database connection pool exhausted"});
    let result = evaluate_error_response(&response(500, body));
    assert!(result.identifies_field);

    let body = json!({"code": "INTERNAL", "message": "Database connection pool exhausted"});
    let result = evaluate_error_response(&response(400, body));
    assert!(!result.identifies_field);
}

#[test]
fn test_comparison_keys_count_as_fix() {
    let body = json!({"message": "Type mismatch", "expected": "integer", "received": "string"});
    let result = evaluate_error_response(&response(400, body));
    assert!(result.suggests_fix);
}

#[test]
fn test_non_object_bodies_score_zero() {
    for body in [
        ResponseBody::Text("<h1>Bad Request</h1>".to_string()),
        ResponseBody::Empty,
        ResponseBody::Json(json!(["not", "an", "object"])),
    ] {
        let mut r = response(400, Value::Null);
        r.body = body;
        let result = evaluate_error_response(&r);
        assert_eq!(result.score, 0);
        assert_eq!(result.feedback.len(), 1);
    }
}

#[test]
fn test_heuristic_evaluator_delegates() {
    let r = response(400, json!({"message": "Error"}));
    assert_eq!(HeuristicEvaluator.evaluate(&r), evaluate_error_response(&r));
}
