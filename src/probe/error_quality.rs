//! How actionable is an error response for an automated caller?
//!
//! | Signal              | Points | Looks for                                            |
//! |---------------------|--------|------------------------------------------------------|
//! | Error code          | 25     | short non-prose string under a code-like key         |
//! | Message             | 15     | non-empty string under a message-like key            |
//! | Helpful message     | 20     | specific, not a stock phrase                         |
//! | Offending field     | 20     | field key, field in an error list, or in the message |
//! | Fix suggestion      | 10     | corrective wording or expected/received keys         |
//! | Documentation link  | 10     | doc URL key or a URL inside the message              |

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::ProbeResponse;

const CODE_KEYS: &[&str] = &["code", "error_code", "errorCode", "error", "type"];
const MESSAGE_KEYS: &[&str] = &["message", "error", "detail", "details", "msg"];
const FIELD_KEYS: &[&str] = &["field", "property", "path", "loc", "param"];
const ERROR_LIST_KEYS: &[&str] = &["detail", "details", "errors"];
const COMPARISON_KEYS: &[&str] = &["expected", "received", "actual"];
const DOC_KEYS: &[&str] = &[
    "docs",
    "documentation",
    "help",
    "more_info",
    "doc_url",
    "link",
    "url",
];

/// Messages that say nothing beyond the status code.
const GENERIC_MESSAGES: &[&str] = &[
    "error",
    "failed",
    "failure",
    "bad request",
    "invalid request",
    "invalid input",
    "internal error",
    "internal server error",
    "server error",
    "unknown error",
    "an error occurred",
    "something went wrong",
    "request failed",
    "not found",
    "unauthorized",
    "forbidden",
    "validation failed",
    "validation error",
];

const MAX_CODE_LEN: usize = 64;
const MIN_HELPFUL_LEN: usize = 10;
const SELF_EXPLANATORY_LEN: usize = 20;

const CODE_POINTS: u8 = 25;
const MESSAGE_POINTS: u8 = 15;
const HELPFUL_POINTS: u8 = 20;
const FIELD_POINTS: u8 = 20;
const FIX_POINTS: u8 = 10;
const DOCS_POINTS: u8 = 10;

static QUOTED_OR_DOTTED_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    // Dotted segments need two characters so prose like `e.g.` and `i.e.` is not a path.
    Regex::new(r#"['"`][A-Za-z_][A-Za-z0-9_.\[\]-]*['"`]|\b[A-Za-z_]\w+(?:\.[A-Za-z_]\w+)+\b"#)
        .expect("valid identifier regex")
});

static SPECIFICITY_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(must|should|expected|received)\b").expect("valid specificity regex")
});

static FIX_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(should be|must be|expected|try|use|provide|include|required|allowed|valid values|example|such as|like)\b|\be\.g\.",
    )
    .expect("valid fix phrase regex")
});

static EMBEDDED_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorQualityResult {
    pub has_error_code: bool,
    pub has_message: bool,
    pub message_is_helpful: bool,
    pub identifies_field: bool,
    pub suggests_fix: bool,
    pub has_doc_link: bool,
    pub score: u8,
    pub feedback: Vec<String>,
}

/// Rates error responses. Implementations must be stateless.
pub trait ResponseQualityEvaluator: Send + Sync {
    fn evaluate(&self, response: &ProbeResponse) -> ErrorQualityResult;
}

/// The built-in keyword heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEvaluator;

impl ResponseQualityEvaluator for HeuristicEvaluator {
    fn evaluate(&self, response: &ProbeResponse) -> ErrorQualityResult {
        evaluate_error_response(response)
    }
}

pub fn evaluate_error_response(response: &ProbeResponse) -> ErrorQualityResult {
    let Some(Value::Object(body)) = response.body.as_json() else {
        return ErrorQualityResult {
            feedback: vec!["Response body is not a JSON object; nothing to act on".to_string()],
            ..Default::default()
        };
    };

    // `{"error": {"code": ..., "message": ...}}` envelopes are read alongside the top level.
    let mut scopes = vec![body];
    if let Some(Value::Object(nested)) = body.get("error") {
        scopes.push(nested);
    }

    let message = scopes.iter().find_map(|scope| message_of(scope));

    let has_error_code = scopes.iter().any(|scope| has_code(scope));
    let has_message = message.is_some();
    let message_is_helpful = message.map(is_helpful).unwrap_or(false);
    let identifies_field = !field_attribution_expected(response.status)
        || scopes.iter().any(|scope| names_field(scope))
        || message.map(mentions_identifier).unwrap_or(false);
    let suggests_fix = message.map(|m| FIX_PHRASES.is_match(m)).unwrap_or(false)
        || scopes
            .iter()
            .any(|scope| COMPARISON_KEYS.iter().any(|k| scope.contains_key(*k)));
    let has_doc_link = scopes.iter().any(|scope| has_doc_field(scope))
        || message.map(|m| EMBEDDED_URL.is_match(m)).unwrap_or(false);

    let mut score = 0;
    let mut feedback = Vec::new();
    let mut tally = |present: bool, points: u8, missing: &str| {
        if present {
            score += points;
        } else {
            feedback.push(missing.to_string());
        }
    };

    tally(
        has_error_code,
        CODE_POINTS,
        "No machine-readable error code (e.g. \"code\": \"VALIDATION_ERROR\")",
    );
    tally(
        has_message,
        MESSAGE_POINTS,
        "No error message under message/error/detail/msg",
    );
    tally(
        message_is_helpful,
        HELPFUL_POINTS,
        "Error message is too generic for a caller to act on",
    );
    tally(
        identifies_field,
        FIELD_POINTS,
        "Error does not say which field was wrong",
    );
    tally(
        suggests_fix,
        FIX_POINTS,
        "Error does not suggest how to correct the request",
    );
    tally(
        has_doc_link,
        DOCS_POINTS,
        "No link to documentation about this error",
    );

    ErrorQualityResult {
        has_error_code,
        has_message,
        message_is_helpful,
        identifies_field,
        suggests_fix,
        has_doc_link,
        score,
        feedback,
    }
}

/// Field attribution only means something for validation failures.
fn field_attribution_expected(status: Option<u16>) -> bool {
    matches!(status, Some(400) | Some(422))
}

fn has_code(scope: &Map<String, Value>) -> bool {
    CODE_KEYS.iter().any(|key| {
        scope
            .get(*key)
            .and_then(Value::as_str)
            .map(is_machine_code)
            .unwrap_or(false)
    })
}

/// `VALIDATION_ERROR`, `invalid_email`, `E1001`; not prose.
fn is_machine_code(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.len() > MAX_CODE_LEN {
        return false;
    }
    let upper_case = value.chars().any(char::is_alphabetic) && value == value.to_uppercase();
    !value.contains(' ') || upper_case
}

fn message_of(scope: &Map<String, Value>) -> Option<&str> {
    MESSAGE_KEYS.iter().find_map(|key| {
        scope
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|m| !m.is_empty())
    })
}

fn is_helpful(message: &str) -> bool {
    if message.chars().count() < MIN_HELPFUL_LEN {
        return false;
    }
    let normalized = message
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    if GENERIC_MESSAGES.contains(&normalized.as_str()) {
        return false;
    }
    message.contains(['"', '\'', '`'])
        || message.chars().any(|c| c.is_ascii_digit())
        || SPECIFICITY_WORDS.is_match(message)
        || message.chars().count() > SELF_EXPLANATORY_LEN
}

fn names_field(scope: &Map<String, Value>) -> bool {
    let has_field_key = |object: &Map<String, Value>| {
        FIELD_KEYS
            .iter()
            .any(|key| object.get(*key).map(|v| !v.is_null()).unwrap_or(false))
    };

    if has_field_key(scope) {
        return true;
    }
    ERROR_LIST_KEYS.iter().any(|key| match scope.get(*key) {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_object().map(has_field_key).unwrap_or(false)),
        _ => false,
    })
}

fn mentions_identifier(message: &str) -> bool {
    QUOTED_OR_DOTTED_IDENTIFIER.is_match(message)
}

fn has_doc_field(scope: &Map<String, Value>) -> bool {
    DOC_KEYS.iter().any(|key| {
        scope
            .get(*key)
            .and_then(Value::as_str)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_code_detection() {
        assert!(is_machine_code("VALIDATION_ERROR"));
        assert!(is_machine_code("invalid_email"));
        assert!(is_machine_code("NOT FOUND"));
        assert!(!is_machine_code("Something bad happened"));
        assert!(!is_machine_code(""));
    }

    #[test]
    fn test_generic_messages_are_not_helpful() {
        assert!(!is_helpful("Bad Request"));
        assert!(!is_helpful("Validation failed."));
        assert!(!is_helpful("Something went wrong"));
        assert!(is_helpful("limit must be <= 100"));
        assert!(is_helpful("The request payload could not be processed"));
    }

    #[test]
    fn test_dotted_identifiers_but_not_abbreviations() {
        assert!(mentions_identifier("customer.address.zip is too long"));
        assert!(mentions_identifier("Field 'email' is invalid"));
        assert!(!mentions_identifier("use ISO dates, e.g. 2024-01-01"));
        assert!(!mentions_identifier("bad value, i.e. not a date"));
    }

    #[test]
    fn test_fix_phrases_respect_word_boundaries() {
        assert!(FIX_PHRASES.is_match("Provide an email address"));
        assert!(FIX_PHRASES.is_match("use ISO dates, e.g. 2024-01-01"));
        assert!(!FIX_PHRASES.is_match("Unknown country entry"));
    }
}
