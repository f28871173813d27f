//! Versioned upgrade of legacy coding schemes.
//!
//! Older authoring tools wrote a bare array of codings (version 1) or a
//! versioned object using the `DERIVE_*` source type names (version 2).
//! [`migrate_scheme`] rewrites either into the current layout before
//! deserializing.

use serde_json::{Map, Value};

use crate::error::SchemeError;
use crate::scheme::CodingScheme;

pub const CURRENT_VERSION: &str = "3.0";
const CURRENT_MAJOR: u64 = 3;

/// Read a scheme payload of any supported version.
pub fn migrate_scheme(raw: &Value) -> Result<CodingScheme, SchemeError> {
    let (major, codings) = match raw {
        Value::Array(items) => (1, items.clone()),
        Value::Object(obj) => {
            let major = match obj.get("version") {
                None | Some(Value::Null) => 1,
                Some(v) => parse_major(v)?,
            };
            let codings = match obj.get("variableCodings") {
                Some(Value::Array(items)) => items.clone(),
                None => Vec::new(),
                Some(other) => {
                    return Err(SchemeError::Layout(format!(
                        "variableCodings must be an array, got {}",
                        other
                    )))
                }
            };
            (major, codings)
        }
        other => {
            return Err(SchemeError::Layout(format!(
                "expected array or object, got {}",
                other
            )))
        }
    };

    if major > CURRENT_MAJOR {
        return Err(SchemeError::UnsupportedVersion {
            version: major.to_string(),
        });
    }

    let codings = if major < CURRENT_MAJOR {
        codings.into_iter().map(upgrade_coding).collect()
    } else {
        codings
    };

    let mut scheme = Map::new();
    scheme.insert("version".to_string(), Value::from(CURRENT_VERSION));
    scheme.insert("variableCodings".to_string(), Value::Array(codings));
    CodingScheme::from_json(&Value::Object(scheme))
}

fn parse_major(version: &Value) -> Result<u64, SchemeError> {
    let unsupported = || SchemeError::UnsupportedVersion {
        version: version.to_string(),
    };
    match version {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as u64))
            .ok_or_else(unsupported),
        Value::String(s) => s
            .split('.')
            .next()
            .and_then(|major| major.trim().parse::<u64>().ok())
            .ok_or_else(unsupported),
        _ => Err(unsupported()),
    }
}

fn upgrade_source_type(name: &str) -> &str {
    match name {
        "DERIVE_CONCAT" => "CONCAT_CODE",
        "DERIVE_SUM" => "SUM_CODE",
        "DERIVE_SUM_SCORE" => "SUM_SCORE",
        other => other,
    }
}

fn upgrade_coding(coding: Value) -> Value {
    let mut obj = match coding {
        Value::Object(obj) => obj,
        other => return other,
    };

    let source_type = match obj.get("sourceType") {
        Some(Value::String(s)) if !s.is_empty() => upgrade_source_type(s).to_string(),
        _ => "BASE".to_string(),
    };
    obj.insert("sourceType".to_string(), Value::from(source_type));

    for key in ["deriveSources", "processing", "codes"] {
        if !matches!(obj.get(key), Some(Value::Array(_))) {
            obj.insert(key.to_string(), Value::Array(Vec::new()));
        }
    }

    if let Some(Value::Array(codes)) = obj.remove("codes") {
        let codes = codes.into_iter().map(upgrade_code).collect();
        obj.insert("codes".to_string(), Value::Array(codes));
    }

    Value::Object(obj)
}

fn upgrade_code(code: Value) -> Value {
    let mut obj = match code {
        Value::Object(obj) => obj,
        other => return other,
    };

    if obj.get("type").and_then(Value::as_str) == Some("ELSE") {
        obj.insert("type".to_string(), Value::from("RESIDUAL"));
    }

    // Version 1 codes carried their rules directly.
    if !obj.contains_key("ruleSets") {
        let rules = obj.remove("rules");
        let operator_and = obj.remove("ruleOperatorAnd").unwrap_or(Value::Bool(false));
        let rule_sets = match rules {
            Some(Value::Array(rules)) if !rules.is_empty() => {
                let mut rule_set = Map::new();
                rule_set.insert("ruleOperatorAnd".to_string(), operator_and);
                rule_set.insert("rules".to_string(), Value::Array(rules));
                vec![Value::Object(rule_set)]
            }
            _ => Vec::new(),
        };
        obj.insert("ruleSets".to_string(), Value::Array(rule_sets));
    }

    if let Some(Value::Array(rule_sets)) = obj.get_mut("ruleSets") {
        for rule_set in rule_sets.iter_mut() {
            if let Value::Object(rs) = rule_set {
                let blank = match rs.get("valueArrayPos") {
                    Some(Value::String(s)) => s.is_empty(),
                    Some(Value::Null) => true,
                    _ => false,
                };
                if blank {
                    rs.remove("valueArrayPos");
                }
            }
        }
    }

    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{CodeType, SourceType};

    #[test]
    fn bare_array_is_version_one() {
        let scheme = migrate_scheme(&serde_json::json!([
            { "id": "a" },
            {
                "id": "sum",
                "sourceType": "DERIVE_SUM",
                "deriveSources": ["a"],
                "codes": [
                    {
                        "id": 1,
                        "type": "ELSE",
                        "score": 0,
                        "ruleOperatorAnd": true,
                        "rules": [{ "method": "IS_NULL" }]
                    }
                ]
            }
        ]))
        .unwrap();
        assert_eq!(scheme.version, CURRENT_VERSION);
        assert_eq!(scheme.variable_codings[0].source_type, SourceType::Base);
        let sum = &scheme.variable_codings[1];
        assert_eq!(sum.source_type, SourceType::SumCode);
        assert_eq!(sum.codes[0].code_type, CodeType::Residual);
        assert_eq!(sum.codes[0].rule_sets.len(), 1);
        assert!(sum.codes[0].rule_sets[0].rule_operator_and);
    }

    #[test]
    fn version_two_maps_concat_and_drops_blank_positions() {
        let scheme = migrate_scheme(&serde_json::json!({
            "version": "2.1",
            "variableCodings": [
                {
                    "id": "c",
                    "sourceType": "DERIVE_CONCAT",
                    "deriveSources": ["a", "b"],
                    "codes": [
                        {
                            "id": 1,
                            "ruleSets": [
                                { "valueArrayPos": "", "rules": [{ "method": "IS_EMPTY" }] }
                            ]
                        }
                    ]
                }
            ]
        }))
        .unwrap();
        let c = &scheme.variable_codings[0];
        assert_eq!(c.source_type, SourceType::ConcatCode);
        assert_eq!(c.codes[0].rule_sets[0].value_array_pos, None);
    }

    #[test]
    fn current_version_passes_through() {
        let scheme = migrate_scheme(&serde_json::json!({
            "version": "3.0",
            "variableCodings": [{ "id": "x", "sourceType": "SUM_SCORE", "deriveSources": ["a", "b"] }]
        }))
        .unwrap();
        assert_eq!(scheme.variable_codings[0].source_type, SourceType::SumScore);
    }

    #[test]
    fn future_version_is_rejected() {
        let err = migrate_scheme(&serde_json::json!({ "version": "9.0", "variableCodings": [] }))
            .unwrap_err();
        assert!(matches!(err, SchemeError::UnsupportedVersion { .. }));
    }

    #[test]
    fn scalar_payload_is_rejected() {
        let err = migrate_scheme(&serde_json::json!("nope")).unwrap_err();
        assert!(matches!(err, SchemeError::Layout(_)));
    }
}
