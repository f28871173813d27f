//! Responses: the values a test-taker produced, plus the code and score
//! the evaluator assigns to them.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// ──────────────────────────────────────────────
// Status
// ──────────────────────────────────────────────

/// Lifecycle status of a response.
///
/// Declaration order is the propagation precedence: when several source
/// responses disagree, the variant listed first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Unset,
    NotReached,
    Displayed,
    PartlyDisplayed,
    ValueChanged,
    DerivePending,
    DeriveError,
    NoCoding,
    Invalid,
    CodingIncomplete,
    CodingError,
    CodingComplete,
    IntendedIncomplete,
}

impl ResponseStatus {
    /// Every status, in precedence order.
    pub const ALL: [ResponseStatus; 13] = [
        ResponseStatus::Unset,
        ResponseStatus::NotReached,
        ResponseStatus::Displayed,
        ResponseStatus::PartlyDisplayed,
        ResponseStatus::ValueChanged,
        ResponseStatus::DerivePending,
        ResponseStatus::DeriveError,
        ResponseStatus::NoCoding,
        ResponseStatus::Invalid,
        ResponseStatus::CodingIncomplete,
        ResponseStatus::CodingError,
        ResponseStatus::CodingComplete,
        ResponseStatus::IntendedIncomplete,
    ];

    /// Position in the precedence order (0 = highest precedence).
    pub fn precedence(self) -> usize {
        ResponseStatus::ALL
            .iter()
            .position(|s| *s == self)
            .unwrap_or(ResponseStatus::ALL.len())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Unset => "UNSET",
            ResponseStatus::NotReached => "NOT_REACHED",
            ResponseStatus::Displayed => "DISPLAYED",
            ResponseStatus::PartlyDisplayed => "PARTLY_DISPLAYED",
            ResponseStatus::ValueChanged => "VALUE_CHANGED",
            ResponseStatus::DerivePending => "DERIVE_PENDING",
            ResponseStatus::DeriveError => "DERIVE_ERROR",
            ResponseStatus::NoCoding => "NO_CODING",
            ResponseStatus::Invalid => "INVALID",
            ResponseStatus::CodingIncomplete => "CODING_INCOMPLETE",
            ResponseStatus::CodingError => "CODING_ERROR",
            ResponseStatus::CodingComplete => "CODING_COMPLETE",
            ResponseStatus::IntendedIncomplete => "INTENDED_INCOMPLETE",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Values
// ──────────────────────────────────────────────

/// A response value: a scalar or an array of values (nested at most one
/// level deep in practice).
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ResponseValue>),
}

/// Largest integer a double represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

impl Serialize for ResponseValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseValue::Null => serializer.serialize_unit(),
            ResponseValue::Bool(b) => serializer.serialize_bool(*b),
            ResponseValue::Number(n) => {
                // Integral numbers go out as JSON integers so payloads round-trip.
                if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            ResponseValue::String(s) => serializer.serialize_str(s),
            ResponseValue::Array(items) => items.serialize(serializer),
        }
    }
}

impl ResponseValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ResponseValue::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ResponseValue::Array(_))
    }

    pub fn as_array(&self) -> Option<&[ResponseValue]> {
        match self {
            ResponseValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for ResponseValue {
    fn from(b: bool) -> Self {
        ResponseValue::Bool(b)
    }
}

impl From<f64> for ResponseValue {
    fn from(n: f64) -> Self {
        ResponseValue::Number(n)
    }
}

impl From<i64> for ResponseValue {
    fn from(n: i64) -> Self {
        ResponseValue::Number(n as f64)
    }
}

impl From<&str> for ResponseValue {
    fn from(s: &str) -> Self {
        ResponseValue::String(s.to_string())
    }
}

impl From<String> for ResponseValue {
    fn from(s: String) -> Self {
        ResponseValue::String(s)
    }
}

impl<T: Into<ResponseValue>> From<Vec<T>> for ResponseValue {
    fn from(items: Vec<T>) -> Self {
        ResponseValue::Array(items.into_iter().map(Into::into).collect())
    }
}

// ──────────────────────────────────────────────
// Response
// ──────────────────────────────────────────────

/// A single variable's response within an assessment unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub value: ResponseValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

impl Response {
    pub fn new(
        id: impl Into<String>,
        status: ResponseStatus,
        value: impl Into<ResponseValue>,
    ) -> Self {
        Response {
            id: id.into(),
            status,
            value: value.into(),
            subform: None,
            code: None,
            score: None,
        }
    }

    /// A response with no value yet.
    pub fn unset(id: impl Into<String>) -> Self {
        Response::new(id, ResponseStatus::Unset, ResponseValue::Null)
    }

    pub fn with_subform(mut self, subform: Option<String>) -> Self {
        self.subform = subform;
        self
    }

    pub fn with_code(mut self, code: i64, score: i64) -> Self {
        self.code = Some(code);
        self.score = Some(score);
        self
    }

    /// Subform name, treating the empty string as "no subform".
    pub fn subform_key(&self) -> Option<&str> {
        self.subform.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_follows_declaration_order() {
        assert_eq!(ResponseStatus::Unset.precedence(), 0);
        assert!(ResponseStatus::DeriveError.precedence() < ResponseStatus::Invalid.precedence());
        assert_eq!(ResponseStatus::IntendedIncomplete.precedence(), 12);
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_value(ResponseStatus::CodingComplete).unwrap();
        assert_eq!(json, serde_json::json!("CODING_COMPLETE"));
        let back: ResponseStatus = serde_json::from_value(serde_json::json!("NOT_REACHED")).unwrap();
        assert_eq!(back, ResponseStatus::NotReached);
    }

    #[test]
    fn value_deserializes_every_shape() {
        let v: ResponseValue = serde_json::from_value(serde_json::json!(null)).unwrap();
        assert_eq!(v, ResponseValue::Null);
        let v: ResponseValue = serde_json::from_value(serde_json::json!(3)).unwrap();
        assert_eq!(v, ResponseValue::Number(3.0));
        let v: ResponseValue = serde_json::from_value(serde_json::json!(["a", [1, true]])).unwrap();
        assert_eq!(
            v,
            ResponseValue::Array(vec![
                ResponseValue::from("a"),
                ResponseValue::Array(vec![ResponseValue::Number(1.0), ResponseValue::Bool(true)]),
            ])
        );
    }

    #[test]
    fn integral_numbers_serialize_as_integers() {
        let json = serde_json::to_value(ResponseValue::Number(4.0)).unwrap();
        assert_eq!(json, serde_json::json!(4));
        let json = serde_json::to_value(ResponseValue::Number(4.5)).unwrap();
        assert_eq!(json, serde_json::json!(4.5));
    }

    #[test]
    fn response_defaults_missing_value_to_null() {
        let r: Response =
            serde_json::from_value(serde_json::json!({ "id": "v1", "status": "UNSET" })).unwrap();
        assert_eq!(r.value, ResponseValue::Null);
        assert_eq!(r.subform_key(), None);
        let out = serde_json::to_value(&r).unwrap();
        assert_eq!(
            out,
            serde_json::json!({ "id": "v1", "status": "UNSET", "value": null })
        );
    }

    #[test]
    fn empty_subform_is_no_subform() {
        let r = Response::unset("a").with_subform(Some(String::new()));
        assert_eq!(r.subform_key(), None);
    }
}
