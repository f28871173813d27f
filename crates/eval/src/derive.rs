//! Derivation engine.
//!
//! A derived variable's status is decided from its sources' statuses first
//! (errors and gaps propagate upwards in a fixed order) and only then is a
//! value computed, according to the variable's source type.

use scorebook_scheme::{
    Processing, Response, ResponseStatus, ResponseValue, SourceType, VariableCodingData,
};

use crate::error::EvalError;
use crate::solver;
use crate::transform::{format_number, get_value_as_number, get_value_as_string};

use ResponseStatus::*;

// ──────────────────────────────────────────────
// Status sets
// ──────────────────────────────────────────────

/// Sources that may be waiting for something else when a derivation is
/// reported as pending.
const PENDING_CHECK: &[ResponseStatus] = &[
    CodingComplete,
    CodingIncomplete,
    DerivePending,
    IntendedIncomplete,
];

/// Valid source statuses for CONCAT_CODE, SUM_CODE and SUM_SCORE.
const VALID_FOR_CODES: &[ResponseStatus] = &[
    CodingComplete,
    CodingIncomplete,
    IntendedIncomplete,
    DerivePending,
];

/// Valid source statuses for COPY_VALUE, UNIQUE_VALUES, SOLVER and MANUAL.
const VALID_FOR_VALUES: &[ResponseStatus] = &[
    ValueChanged,
    CodingComplete,
    CodingIncomplete,
    IntendedIncomplete,
    DerivePending,
];

/// Sources whose value takes part in a UNIQUE_VALUES comparison.
const VALID_FOR_UNIQUE: &[ResponseStatus] = &[
    ValueChanged,
    CodingComplete,
    CodingIncomplete,
    IntendedIncomplete,
];

/// If every source is in this set, a mixed failure reads as partly displayed.
const PARTLY_DISPLAYED_CLASS: &[ResponseStatus] = &[
    Displayed,
    PartlyDisplayed,
    ValueChanged,
    CodingComplete,
    CodingIncomplete,
    IntendedIncomplete,
    DerivePending,
];

const CONCAT_DELIMITER: &str = "_";
const UNIQUE_ARRAY_DELIMITER: &str = "##";

// ──────────────────────────────────────────────
// Entry point
// ──────────────────────────────────────────────

/// Derive `coding`'s response from its source responses.
///
/// `all_codings` is used to resolve solver aliases and to match sources
/// that carry aliases instead of ids. The returned response carries the
/// subform of the first source. Fails for non-derived codings and for
/// solver expressions that do not parse.
pub fn derive_value(
    all_codings: &[VariableCodingData],
    coding: &VariableCodingData,
    sources: &[Response],
) -> Result<Response, EvalError> {
    if coding.is_base() {
        return Err(EvalError::NotDerived {
            variable_id: coding.id.clone(),
            source_type: coding.source_type,
        });
    }

    let subform = sources.first().and_then(|s| s.subform.clone());
    let result = |status: ResponseStatus, value: ResponseValue| {
        Response::new(coding.id.clone(), status, value).with_subform(subform.clone())
    };

    if sources.is_empty() {
        return Ok(result(DeriveError, ResponseValue::Null));
    }
    if let Some(status) = propagated_status(coding, sources) {
        return Ok(result(status, ResponseValue::Null));
    }

    let derived = match coding.source_type {
        SourceType::Manual => {
            let status = if sources.iter().all(|s| s.status == IntendedIncomplete) {
                CodingIncomplete
            } else {
                CodingComplete
            };
            result(status, ResponseValue::Null)
        }
        SourceType::CopyValue => {
            if sources.iter().any(|s| s.status == DerivePending) {
                result(DerivePending, ResponseValue::Null)
            } else {
                result(ValueChanged, sources[0].value.clone())
            }
        }
        SourceType::ConcatCode => result(ValueChanged, concat_codes(coding, sources).into()),
        SourceType::SumCode | SourceType::SumScore => {
            match sum_sources(all_codings, coding, sources) {
                Some(total) => result(ValueChanged, ResponseValue::Number(total)),
                None => result(DeriveError, ResponseValue::Null),
            }
        }
        SourceType::UniqueValues => {
            result(ValueChanged, ResponseValue::Bool(all_unique(coding, sources)))
        }
        SourceType::Solver => match solve(all_codings, coding, sources)? {
            Some(n) => result(ValueChanged, ResponseValue::Number(n)),
            None => result(DeriveError, ResponseValue::Null),
        },
        SourceType::Base | SourceType::BaseNoValue => {
            return Err(EvalError::NotDerived {
                variable_id: coding.id.clone(),
                source_type: coding.source_type,
            })
        }
    };
    tracing::debug!(
        variable = %coding.id,
        source_type = %coding.source_type,
        status = %derived.status,
        "derived"
    );
    Ok(derived)
}

/// The status forced by the sources, if any.
fn propagated_status(
    coding: &VariableCodingData,
    sources: &[Response],
) -> Option<ResponseStatus> {
    let any = |status: ResponseStatus| sources.iter().any(|s| s.status == status);

    if any(Unset) {
        return Some(Unset);
    }
    if any(DeriveError) || any(NoCoding) {
        return Some(DeriveError);
    }
    if any(CodingError) {
        return Some(CodingError);
    }
    if any(Invalid) {
        return Some(Invalid);
    }

    let waits_for_pending = !matches!(
        coding.source_type,
        SourceType::Manual | SourceType::CopyValue | SourceType::UniqueValues | SourceType::Solver
    );
    if waits_for_pending
        && (any(CodingIncomplete) || any(DerivePending))
        && sources.iter().all(|s| PENDING_CHECK.contains(&s.status))
    {
        return Some(DerivePending);
    }

    let valid = valid_states(coding);
    let false_states = sources
        .iter()
        .filter(|s| !valid.contains(&s.status))
        .count();
    let fails = if coding.source_type == SourceType::UniqueValues {
        false_states == sources.len()
    } else {
        false_states > 0
    };
    if !fails {
        return None;
    }

    let first = sources[0].status;
    if sources.iter().all(|s| s.status == first) {
        Some(first)
    } else if sources
        .iter()
        .all(|s| PARTLY_DISPLAYED_CLASS.contains(&s.status))
    {
        Some(PartlyDisplayed)
    } else {
        Some(Invalid)
    }
}

fn valid_states(coding: &VariableCodingData) -> Vec<ResponseStatus> {
    let mut valid = match coding.source_type {
        SourceType::ConcatCode | SourceType::SumCode | SourceType::SumScore => {
            VALID_FOR_CODES.to_vec()
        }
        _ => VALID_FOR_VALUES.to_vec(),
    };
    if coding.source_type == SourceType::Manual {
        if coding.has_processing(Processing::TakeDisplayedAsValueChanged) {
            valid.push(Displayed);
        }
        if coding.has_processing(Processing::TakeNotReachedAsValueChanged) {
            valid.push(NotReached);
        }
    }
    valid
}

// ──────────────────────────────────────────────
// Per source type
// ──────────────────────────────────────────────

fn concat_codes(coding: &VariableCodingData, sources: &[Response]) -> String {
    let mut parts: Vec<String> = sources
        .iter()
        .map(|s| match s.code {
            Some(code) => code.to_string(),
            None => "?".to_string(),
        })
        .collect();
    if coding.has_source_processing(Processing::Sort) {
        parts.sort();
    }
    parts.join(CONCAT_DELIMITER)
}

/// Sum of the sources' codes or scores; `None` if a declared source has
/// no response or the sum overflows.
fn sum_sources(
    all_codings: &[VariableCodingData],
    coding: &VariableCodingData,
    sources: &[Response],
) -> Option<f64> {
    let mut total = 0i64;
    for source_id in &coding.derive_sources {
        let response = find_source(all_codings, sources, source_id)?;
        let part = if coding.source_type == SourceType::SumScore {
            response.score
        } else {
            response.code
        };
        total = total.checked_add(part.unwrap_or(0))?;
    }
    Some(total as f64)
}

fn all_unique(coding: &VariableCodingData, sources: &[Response]) -> bool {
    let processing = coding.source_processing();
    let to_number = processing.contains(&Processing::ToNumber);
    let mut seen: Vec<String> = Vec::new();
    for source in sources
        .iter()
        .filter(|s| VALID_FOR_UNIQUE.contains(&s.status))
    {
        let key = comparison_key(&source.value, processing, to_number);
        if seen.contains(&key) {
            return false;
        }
        seen.push(key);
    }
    true
}

fn comparison_key(value: &ResponseValue, processing: &[Processing], to_number: bool) -> String {
    match value {
        ResponseValue::Array(items) => items
            .iter()
            .map(|item| comparison_key(item, processing, to_number))
            .collect::<Vec<_>>()
            .join(UNIQUE_ARRAY_DELIMITER),
        scalar => {
            let numeric = if to_number {
                get_value_as_number(scalar).map(format_number)
            } else {
                None
            };
            numeric
                .or_else(|| get_value_as_string(scalar, processing))
                .unwrap_or_default()
        }
    }
}

/// Evaluate the solver expression; `None` when a reference cannot be
/// resolved to a numeric source or the result is not a finite number.
fn solve(
    all_codings: &[VariableCodingData],
    coding: &VariableCodingData,
    sources: &[Response],
) -> Result<Option<f64>, EvalError> {
    let Some(expression) = coding.solver_expression().filter(|e| !e.trim().is_empty()) else {
        return Ok(None);
    };

    let mut values: Vec<(String, f64)> = Vec::new();
    for alias in solver::placeholders(expression) {
        let Some(id) = resolve_alias(all_codings, &alias) else {
            return Ok(None);
        };
        if !coding.derive_sources.iter().any(|s| s == id) {
            return Ok(None);
        }
        let Some(response) = find_source(all_codings, sources, id) else {
            return Ok(None);
        };
        if response.value.is_array() {
            return Ok(None);
        }
        let Some(n) = get_value_as_number(&response.value) else {
            return Ok(None);
        };
        values.push((alias, n));
    }

    let substituted = solver::substitute(expression, |alias| {
        let n = values
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, n)| *n)
            .unwrap_or(f64::NAN);
        format!("({})", format_number(n))
    });
    let n = solver::evaluate(&substituted)?;
    Ok(n.is_finite().then_some(n))
}

fn resolve_alias<'a>(all_codings: &'a [VariableCodingData], alias: &str) -> Option<&'a str> {
    all_codings
        .iter()
        .find(|c| c.alias_or_id() == alias)
        .or_else(|| all_codings.iter().find(|c| c.id == alias))
        .map(|c| c.id.as_str())
}

/// The response for source `id`, which may carry the id or its alias.
fn find_source<'a>(
    all_codings: &[VariableCodingData],
    sources: &'a [Response],
    id: &str,
) -> Option<&'a Response> {
    sources.iter().find(|s| s.id == id).or_else(|| {
        let alias = all_codings.iter().find(|c| c.id == id)?.alias_or_id();
        sources.iter().find(|s| s.id == alias)
    })
}
