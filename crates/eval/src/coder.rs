//! Response coding: pick the first code whose rule sets match a
//! response's (transformed) value.

use fancy_regex::Regex;
use scorebook_scheme::{
    CodeData, CodeId, Processing, Response, ResponseStatus, ResponseValue, SpecialCode,
    VariableCodingData,
};

use crate::error::EvalError;
use crate::rule::is_match_rule_set;
use crate::transform::{get_value_as_string, transform_string};

/// Prepare a value for rule evaluation.
///
/// Strings are fragmented by the coding's `fragmenting` pattern (or
/// space/case normalized when there is none); arrays are transformed
/// member by member and sorted when `SORT_ARRAY` is set.
pub fn transform_value(
    value: &ResponseValue,
    coding: &VariableCodingData,
) -> Result<ResponseValue, EvalError> {
    let fragmenting = match coding.fragmenting.as_deref().filter(|p| !p.is_empty()) {
        Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
            EvalError::InvalidFragmentPattern {
                variable_id: coding.id.clone(),
                message: e.to_string(),
            }
        })?),
        None => None,
    };
    Ok(transform_with(value, fragmenting.as_ref(), &coding.processing))
}

fn transform_with(
    value: &ResponseValue,
    fragmenting: Option<&Regex>,
    processing: &[Processing],
) -> ResponseValue {
    match value {
        ResponseValue::String(s) => transform_string(s, fragmenting, processing),
        ResponseValue::Array(items) => {
            let mut items: Vec<ResponseValue> = items
                .iter()
                .map(|item| match item {
                    ResponseValue::String(s) => transform_string(s, fragmenting, processing),
                    other => other.clone(),
                })
                .collect();
            if processing.contains(&Processing::SortArray) {
                items.sort_by_key(sort_key);
            }
            ResponseValue::Array(items)
        }
        other => other.clone(),
    }
}

fn sort_key(value: &ResponseValue) -> String {
    get_value_as_string(value, &[]).unwrap_or_default()
}

/// Mark a response as failed during coding.
pub fn mark_coding_error(response: &Response) -> Response {
    let mut failed = response.clone();
    failed.status = ResponseStatus::CodingError;
    failed.code = None;
    failed.score = None;
    failed
}

/// Code a response, reporting transformation failures as errors.
pub fn try_code_response(
    response: &Response,
    coding: &VariableCodingData,
) -> Result<Response, EvalError> {
    let mut coded = response.clone();

    if coding.codes.is_empty() || (response.value.is_array() && !coding.is_array_aware()) {
        coded.status = ResponseStatus::NoCoding;
        return Ok(coded);
    }

    let value = transform_value(&response.value, coding)?;
    let is_value_array = response.value.is_array();

    let mut residual: Option<&CodeData> = None;
    for code in &coding.codes {
        if code.rule_sets.is_empty() {
            if code.code_type.is_residual() && residual.is_none() {
                residual = Some(code);
            }
            continue;
        }
        let mut matches = code
            .rule_sets
            .iter()
            .map(|rs| is_match_rule_set(&value, rs, is_value_array, &coding.processing));
        let matched = if code.rule_set_operator_and {
            matches.all(|m| m)
        } else {
            matches.any(|m| m)
        };
        if matched {
            apply_code(&mut coded, code);
            return Ok(coded);
        }
    }

    match residual {
        Some(code) => apply_code(&mut coded, code),
        None => {
            coded.status = ResponseStatus::CodingIncomplete;
            coded.code = Some(0);
            coded.score = Some(0);
        }
    }
    Ok(coded)
}

/// Code a response; a transformation failure yields `CODING_ERROR`.
pub fn code_response(response: &Response, coding: &VariableCodingData) -> Response {
    match try_code_response(response, coding) {
        Ok(coded) => coded,
        Err(e) => {
            tracing::warn!(variable = %coding.id, error = %e, "coding failed");
            mark_coding_error(response)
        }
    }
}

fn apply_code(response: &mut Response, code: &CodeData) {
    match code.id {
        CodeId::Number(id) => {
            response.code = Some(id);
            response.score = Some(code.score);
            response.status = ResponseStatus::CodingComplete;
        }
        CodeId::Special(special) => {
            response.code = None;
            response.score = None;
            response.status = match special {
                SpecialCode::Invalid => ResponseStatus::Invalid,
                SpecialCode::IntendedIncomplete => ResponseStatus::IntendedIncomplete,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorebook_scheme::{ArrayPosition, CodeType, CodingRule, RuleMethod, RuleSet};

    fn changed(value: impl Into<ResponseValue>) -> Response {
        Response::new("v1", ResponseStatus::ValueChanged, value)
    }

    fn match_code(id: i64, score: i64, params: &[&str]) -> CodeData {
        CodeData::new(
            id,
            score,
            vec![RuleSet::new(vec![CodingRule::new(RuleMethod::Match, params)])],
        )
    }

    #[test]
    fn no_codes_is_no_coding() {
        let coded = code_response(&changed("a"), &VariableCodingData::base("v1"));
        assert_eq!(coded.status, ResponseStatus::NoCoding);
    }

    #[test]
    fn first_matching_code_wins() {
        let coding = VariableCodingData::base("v1").with_codes(vec![
            match_code(1, 2, &["yes"]),
            match_code(2, 1, &["yes\nmaybe"]),
        ]);
        let coded = code_response(&changed("yes"), &coding);
        assert_eq!(coded.status, ResponseStatus::CodingComplete);
        assert_eq!((coded.code, coded.score), (Some(1), Some(2)));

        let coded = code_response(&changed("maybe"), &coding);
        assert_eq!((coded.code, coded.score), (Some(2), Some(1)));
    }

    #[test]
    fn unmatched_without_residual_is_incomplete() {
        let coding = VariableCodingData::base("v1").with_codes(vec![match_code(1, 1, &["yes"])]);
        let coded = code_response(&changed("no"), &coding);
        assert_eq!(coded.status, ResponseStatus::CodingIncomplete);
        assert_eq!((coded.code, coded.score), (Some(0), Some(0)));
    }

    #[test]
    fn residual_catches_the_rest() {
        let coding = VariableCodingData::base("v1").with_codes(vec![
            CodeData::residual(9, 0),
            match_code(1, 1, &["yes"]),
        ]);
        let coded = code_response(&changed("yes"), &coding);
        assert_eq!(coded.code, Some(1));
        let coded = code_response(&changed("no"), &coding);
        assert_eq!(coded.status, ResponseStatus::CodingComplete);
        assert_eq!((coded.code, coded.score), (Some(9), Some(0)));
    }

    #[test]
    fn special_codes_set_status() {
        let mut invalid = match_code(0, 0, &["?"]);
        invalid.id = CodeId::Special(SpecialCode::Invalid);
        let mut intended = match_code(0, 0, &["later"]);
        intended.id = CodeId::Special(SpecialCode::IntendedIncomplete);
        let coding = VariableCodingData::base("v1").with_codes(vec![invalid, intended]);

        assert_eq!(code_response(&changed("?"), &coding).status, ResponseStatus::Invalid);
        assert_eq!(
            code_response(&changed("later"), &coding).status,
            ResponseStatus::IntendedIncomplete
        );
    }

    #[test]
    fn rule_set_operator_and_requires_every_set() {
        let code = CodeData::new(
            1,
            1,
            vec![
                RuleSet::new(vec![CodingRule::new(RuleMethod::NumericMin, &["1"])]),
                RuleSet::new(vec![CodingRule::new(RuleMethod::NumericMax, &["5"])]),
            ],
        )
        .all_rule_sets();
        let coding = VariableCodingData::base("v1").with_codes(vec![code]);
        assert_eq!(code_response(&changed("3"), &coding).code, Some(1));
        assert_eq!(
            code_response(&changed("8"), &coding).status,
            ResponseStatus::CodingIncomplete
        );
    }

    #[test]
    fn plain_coding_does_not_code_arrays() {
        let coding = VariableCodingData::base("v1").with_codes(vec![match_code(1, 1, &["a"])]);
        let coded = code_response(&changed(vec!["a"]), &coding);
        assert_eq!(coded.status, ResponseStatus::NoCoding);
    }

    #[test]
    fn array_aware_coding_codes_arrays() {
        let code = CodeData::new(
            1,
            1,
            vec![RuleSet::new(vec![CodingRule::new(RuleMethod::NumericMatch, &["2"])])
                .at(ArrayPosition::Length)],
        );
        let coding = VariableCodingData::base("v1").with_codes(vec![code]);
        let coded = code_response(&changed(vec!["a", "b"]), &coding);
        assert_eq!(coded.status, ResponseStatus::CodingComplete);
    }

    #[test]
    fn fragmenting_splits_strings() {
        let code = CodeData::new(
            1,
            2,
            vec![RuleSet::new(vec![
                CodingRule::new(RuleMethod::NumericMatch, &["3"]).with_fragment(0),
                CodingRule::new(RuleMethod::NumericMatch, &["4"]).with_fragment(1),
            ])
            .all()],
        )
        .with_type(CodeType::FullCredit);
        let coding = VariableCodingData::base("v1")
            .with_fragmenting(r"(\d+)\s*/\s*(\d+)")
            .with_codes(vec![code]);
        let coded = code_response(&changed("3 / 4"), &coding);
        assert_eq!((coded.code, coded.score), (Some(1), Some(2)));
        let coded = code_response(&changed("4/3"), &coding);
        assert_eq!(coded.status, ResponseStatus::CodingIncomplete);
    }

    #[test]
    fn fragmenting_with_lookbehind() {
        let coding = VariableCodingData::base("v1")
            .with_fragmenting(r"(?<=EUR )(\d+)")
            .with_codes(vec![CodeData::new(
                1,
                1,
                vec![RuleSet::new(vec![
                    CodingRule::new(RuleMethod::NumericMatch, &["12"]).with_fragment(0),
                ])],
            )]);
        let coded = code_response(&changed("EUR 12"), &coding);
        assert_eq!(coded.status, ResponseStatus::CodingComplete);
        assert_eq!(coded.code, Some(1));
    }

    #[test]
    fn broken_fragmenting_is_a_coding_error() {
        let coding = VariableCodingData::base("v1")
            .with_fragmenting("(")
            .with_codes(vec![match_code(1, 1, &["a"])]);
        assert!(try_code_response(&changed("a"), &coding).is_err());
        assert_eq!(
            code_response(&changed("a"), &coding).status,
            ResponseStatus::CodingError
        );
    }

    #[test]
    fn sort_array_orders_members() {
        let coding = VariableCodingData::base("v1").with_processing(&[Processing::SortArray]);
        let sorted = transform_value(&ResponseValue::from(vec!["c", "a", "b"]), &coding).unwrap();
        assert_eq!(sorted, ResponseValue::from(vec!["a", "b", "c"]));
    }

    #[test]
    fn input_response_is_untouched() {
        let coding = VariableCodingData::base("v1").with_codes(vec![match_code(1, 1, &["a"])]);
        let input = changed("a");
        let _ = code_response(&input, &coding);
        assert_eq!(input.status, ResponseStatus::ValueChanged);
        assert_eq!(input.code, None);
    }
}
