//! Scalar value conversions shared by the rule evaluator, the coder,
//! and the derivation engine.
//!
//! All functions here are pure: they never fail loudly, and a value that
//! cannot be converted yields `None`.

use std::sync::LazyLock;

use regex::Regex;
use scorebook_scheme::{Processing, ResponseValue};

// SAFETY: constant pattern, verified by the tests below.
static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?\d+(\.\d+)?$").expect("numeric pattern compiles"));

/// Interpret a value as a number.
///
/// `null` and the empty string count as 0, booleans as 0/1. Strings are
/// trimmed, stripped of inner whitespace, and may use a decimal comma.
/// Anything else is not numeric.
pub fn get_value_as_number(value: &ResponseValue) -> Option<f64> {
    match value {
        ResponseValue::Null => Some(0.0),
        ResponseValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        ResponseValue::Number(n) => Some(*n),
        ResponseValue::String(s) => parse_number(s),
        ResponseValue::Array(_) => None,
    }
}

/// Parse a user-entered numeric string.
pub fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return Some(0.0);
    }
    let normalized: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if !NUMERIC.is_match(&normalized) {
        return None;
    }
    normalized.parse::<f64>().ok()
}

/// Render a number the way the authoring tools print it (`2`, not `2.0`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Interpret a scalar as a string, applying space and case processing.
///
/// Returns `None` for `null` and arrays.
pub fn get_value_as_string(value: &ResponseValue, processing: &[Processing]) -> Option<String> {
    match value {
        ResponseValue::Number(n) => Some(format_number(*n)),
        ResponseValue::Bool(b) => Some(b.to_string()),
        ResponseValue::String(s) => Some(normalize_string(s, processing)),
        ResponseValue::Null | ResponseValue::Array(_) => None,
    }
}

/// Apply space removal/collapsing and lower-casing per `processing`.
pub fn normalize_string(s: &str, processing: &[Processing]) -> String {
    let mut out = if processing.iter().any(|p| p.removes_all_spaces()) {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    } else if processing.iter().any(|p| p.removes_dispensable_spaces()) {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        s.to_string()
    };
    if processing.iter().any(|p| p.lowers_case()) {
        out = out.to_lowercase();
    }
    out
}

/// `''` and `[]` are empty; nothing else is.
pub fn is_empty_value(value: &ResponseValue) -> bool {
    match value {
        ResponseValue::String(s) => s.is_empty(),
        ResponseValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Capture groups of the first match of `pattern` in `s`, or nothing.
///
/// Groups that did not participate in the match come back as `""`.
/// A pattern that gives up backtracking counts as not matching.
pub fn extract_fragments(s: &str, pattern: &fancy_regex::Regex) -> Vec<String> {
    match pattern.captures(s) {
        Ok(Some(caps)) => caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    }
}

/// Fragment a string (when a pattern is given) or normalize it.
pub fn transform_string(
    s: &str,
    fragmenting: Option<&fancy_regex::Regex>,
    processing: &[Processing],
) -> ResponseValue {
    match fragmenting {
        Some(pattern) => ResponseValue::Array(
            extract_fragments(s, pattern)
                .into_iter()
                .map(|f| ResponseValue::String(normalize_string(&f, processing)))
                .collect(),
        ),
        None => ResponseValue::String(normalize_string(s, processing)),
    }
}
