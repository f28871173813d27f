//! Scheme orchestration: code every response of a unit against a scheme.
//!
//! Responses are processed in subform groups. Each group runs the same
//! pipeline: alias resolution, status normalization, placeholder
//! synthesis, then derivation and coding in dependency order.

use std::collections::HashSet;

use scorebook_scheme::{
    Processing, Response, ResponseStatus, ResponseValue, SourceType, VariableCodingData,
};

use crate::coder::{mark_coding_error, try_code_response};
use crate::derive::derive_value;
use crate::graph::{assign_levels, VariableGraphNode};
use crate::options::{CodingFailure, CodingOptions, FailureStage};
use crate::transform::is_empty_value;

/// A derived variable in one of these states is (re)derived.
const START_DERIVING: &[ResponseStatus] = &[
    ResponseStatus::Unset,
    ResponseStatus::DerivePending,
    ResponseStatus::Displayed,
    ResponseStatus::NotReached,
    ResponseStatus::PartlyDisplayed,
];

/// Base responses in these states give way to a derived variable of the
/// same id.
const UNSET_LIKE: &[ResponseStatus] = &[
    ResponseStatus::Unset,
    ResponseStatus::NotReached,
    ResponseStatus::Displayed,
    ResponseStatus::PartlyDisplayed,
];

/// Execution plan shared by all subform groups.
struct Plan<'a> {
    codings: &'a [VariableCodingData],
    nodes: Vec<VariableGraphNode>,
    unresolved: HashSet<String>,
}

impl<'a> Plan<'a> {
    fn new(codings: &'a [VariableCodingData]) -> Self {
        let levels = assign_levels(codings);
        let mut nodes = levels.nodes;
        nodes.sort_by_key(|n| n.level);
        if !levels.unresolved.is_empty() {
            tracing::warn!(
                unresolved = ?levels.unresolved,
                "derived variables do not resolve; marking them DERIVE_ERROR"
            );
        }
        tracing::debug!(
            nodes = nodes.len(),
            levels = nodes.last().map(|n| n.level + 1).unwrap_or(0),
            "coding plan built"
        );
        Plan {
            codings,
            nodes,
            unresolved: levels.unresolved.into_iter().collect(),
        }
    }

    fn coding(&self, id: &str) -> Option<&'a VariableCodingData> {
        self.codings.iter().find(|c| c.id == id)
    }
}

/// Code all responses of a unit.
///
/// Every declared coding (except `BASE_NO_VALUE`) is represented in the
/// output once per subform group; missing ones are synthesized as
/// `UNSET`, or `DERIVE_ERROR` when their dependencies cannot resolve.
/// Failures while deriving or coding a single response become that
/// response's status and are reported through `options.on_error`.
pub fn code(
    responses: &[Response],
    codings: &[VariableCodingData],
    options: &CodingOptions,
) -> Vec<Response> {
    let plan = Plan::new(codings);

    let mut output = Vec::new();
    for (subform, group) in subform_groups(responses) {
        tracing::debug!(subform = ?subform, responses = group.len(), "coding group");
        output.extend(code_group(group, subform, &plan, options));
    }

    remove_duplicates(output, codings)
}

fn subform_groups(responses: &[Response]) -> Vec<(Option<String>, Vec<Response>)> {
    let mut subforms: Vec<&str> = Vec::new();
    for response in responses {
        if let Some(subform) = response.subform_key() {
            if !subforms.contains(&subform) {
                subforms.push(subform);
            }
        }
    }
    if subforms.is_empty() {
        return vec![(None, responses.to_vec())];
    }

    subforms
        .into_iter()
        .map(|subform| {
            let group = responses
                .iter()
                .filter(|r| r.subform_key().is_none() || r.subform_key() == Some(subform))
                .cloned()
                .collect();
            (Some(subform.to_string()), group)
        })
        .collect()
}

fn code_group(
    mut responses: Vec<Response>,
    subform: Option<String>,
    plan: &Plan<'_>,
    options: &CodingOptions,
) -> Vec<Response> {
    resolve_aliases(&mut responses, plan.codings);
    normalize_base_statuses(&mut responses, plan);
    responses.retain(|r| {
        !(UNSET_LIKE.contains(&r.status) && plan.coding(&r.id).is_some_and(|c| !c.is_base()))
    });
    add_placeholders(&mut responses, &subform, plan);

    for node in &plan.nodes {
        let Some(coding) = plan.coding(&node.id) else {
            continue;
        };
        let Some(index) = responses.iter().position(|r| r.id == node.id) else {
            continue;
        };
        let current = &responses[index];

        if !node.sources.is_empty() && START_DERIVING.contains(&current.status) {
            let sources: Vec<Response> = coding
                .derive_sources
                .iter()
                .filter_map(|id| responses.iter().find(|r| &r.id == id).cloned())
                .collect();
            let updated = match derive_value(plan.codings, coding, &sources) {
                Ok(mut derived) => {
                    derived.subform = sources
                        .iter()
                        .find_map(|s| s.subform_key().map(str::to_string))
                        .or_else(|| subform.clone());
                    if derived.status == ResponseStatus::ValueChanged {
                        apply_codes(&derived, coding, options)
                    } else {
                        derived
                    }
                }
                Err(e) => {
                    options.report(&CodingFailure {
                        variable_id: coding.id.clone(),
                        subform: subform.clone(),
                        stage: FailureStage::Derive,
                        message: e.to_string(),
                    });
                    let mut failed = current.clone();
                    failed.status = ResponseStatus::DeriveError;
                    failed.value = ResponseValue::Null;
                    failed
                }
            };
            responses[index] = updated;
        } else if current.status == ResponseStatus::ValueChanged {
            let coded = apply_codes(current, coding, options);
            responses[index] = coded;
        }
    }

    for response in &mut responses {
        if let Some(coding) = plan.coding(&response.id) {
            response.id = coding.alias_or_id().to_string();
        }
    }
    responses
}

/// Incoming responses may name a variable by its alias.
fn resolve_aliases(responses: &mut [Response], codings: &[VariableCodingData]) {
    for response in responses.iter_mut() {
        if codings.iter().any(|c| c.id == response.id) {
            continue;
        }
        if let Some(coding) = codings
            .iter()
            .find(|c| c.alias.as_deref() == Some(response.id.as_str()))
        {
            response.id = coding.id.clone();
        }
    }
}

fn normalize_base_statuses(responses: &mut [Response], plan: &Plan<'_>) {
    for response in responses.iter_mut() {
        let Some(coding) = plan.coding(&response.id) else {
            continue;
        };
        if coding.source_type != SourceType::Base {
            continue;
        }
        let take_as_changed = match response.status {
            ResponseStatus::Displayed => {
                coding.has_processing(Processing::TakeDisplayedAsValueChanged)
            }
            ResponseStatus::NotReached => {
                coding.has_processing(Processing::TakeNotReachedAsValueChanged)
            }
            _ => false,
        };
        if take_as_changed {
            response.status = ResponseStatus::ValueChanged;
        }
        if response.status == ResponseStatus::ValueChanged
            && is_empty_value(&response.value)
            && !coding.has_processing(Processing::TakeEmptyAsValid)
        {
            response.status = ResponseStatus::Invalid;
        }
    }
}

fn add_placeholders(responses: &mut Vec<Response>, subform: &Option<String>, plan: &Plan<'_>) {
    for coding in plan.codings {
        if coding.source_type == SourceType::BaseNoValue {
            continue;
        }
        let forced = plan.unresolved.contains(&coding.id);
        match responses.iter_mut().find(|r| r.id == coding.id) {
            Some(existing) => {
                if forced {
                    existing.status = ResponseStatus::DeriveError;
                    existing.value = ResponseValue::Null;
                }
            }
            None => {
                let status = if forced {
                    ResponseStatus::DeriveError
                } else {
                    ResponseStatus::Unset
                };
                responses.push(
                    Response::new(coding.id.clone(), status, ResponseValue::Null)
                        .with_subform(subform.clone()),
                );
            }
        }
    }
}

fn apply_codes(
    response: &Response,
    coding: &VariableCodingData,
    options: &CodingOptions,
) -> Response {
    if coding.codes.is_empty() {
        let kept_empty = coding.source_type == SourceType::Base
            && coding.has_processing(Processing::TakeEmptyAsValid)
            && is_empty_value(&response.value);
        let mut out = response.clone();
        if !kept_empty {
            out.status = ResponseStatus::NoCoding;
        }
        return out;
    }
    match try_code_response(response, coding) {
        Ok(coded) => coded,
        Err(e) => {
            options.report(&CodingFailure {
                variable_id: coding.id.clone(),
                subform: response.subform.clone(),
                stage: FailureStage::Code,
                message: e.to_string(),
            });
            mark_coding_error(response)
        }
    }
}

/// Drop `UNSET` responses shadowed by a derived variable's result, then
/// keep the first response per (id, subform).
fn remove_duplicates(responses: Vec<Response>, codings: &[VariableCodingData]) -> Vec<Response> {
    let derived_names: HashSet<&str> = codings
        .iter()
        .filter(|c| !c.is_base())
        .map(|c| c.alias_or_id())
        .collect();
    let settled: HashSet<(String, Option<String>)> = responses
        .iter()
        .filter(|r| r.status != ResponseStatus::Unset)
        .map(|r| (r.id.clone(), r.subform_key().map(str::to_string)))
        .collect();

    let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
    responses
        .into_iter()
        .filter(|r| {
            let key = (r.id.clone(), r.subform_key().map(str::to_string));
            let shadowed = r.status == ResponseStatus::Unset
                && derived_names.contains(r.id.as_str())
                && settled.contains(&key);
            !shadowed && seen.insert(key)
        })
        .collect()
}
