//! Checks on where variables get their values from: base variable
//! declarations, derive sources, and the dependency graph.

use std::collections::HashSet;

use scorebook_eval::{get_variable_dependency_tree, solver, EvalError};
use scorebook_scheme::{SourceType, VariableCodingData, VariableInfo};

use crate::problem::{CodingSchemeProblem, ProblemType};

/// Run all source checks.
pub fn check_sources(
    variables: &[VariableInfo],
    codings: &[VariableCodingData],
) -> Vec<CodingSchemeProblem> {
    let mut problems = Vec::new();
    for (index, coding) in codings.iter().enumerate() {
        if collides(index, codings) {
            problems.push(CodingSchemeProblem::new(ProblemType::InvalidSource, coding));
        }
        if coding.is_base() {
            check_base(coding, variables, &mut problems);
        } else {
            check_derived(coding, codings, &mut problems);
        }
    }
    check_cycles(codings, &mut problems);
    problems
}

/// True if the coding repeats an earlier id or alias, or its alias names
/// another variable.
fn collides(index: usize, codings: &[VariableCodingData]) -> bool {
    let coding = &codings[index];
    let earlier = &codings[..index];
    if earlier.iter().any(|c| c.id == coding.id) {
        return true;
    }
    let Some(alias) = coding.alias.as_deref().filter(|a| !a.is_empty()) else {
        return false;
    };
    earlier
        .iter()
        .any(|c| c.alias.as_deref() == Some(alias))
        || codings
            .iter()
            .enumerate()
            .any(|(i, c)| i != index && c.id == alias)
}

fn check_base(
    coding: &VariableCodingData,
    variables: &[VariableInfo],
    problems: &mut Vec<CodingSchemeProblem>,
) {
    let Some(info) = variables.iter().find(|v| v.id == coding.id) else {
        problems.push(CodingSchemeProblem::new(ProblemType::SourceMissing, coding));
        return;
    };
    let wrong_kind = match coding.source_type {
        SourceType::BaseNoValue => !info.is_no_value(),
        _ => info.is_no_value(),
    };
    if wrong_kind {
        problems.push(CodingSchemeProblem::new(ProblemType::InvalidSource, coding));
    }
}

fn check_derived(
    coding: &VariableCodingData,
    codings: &[VariableCodingData],
    problems: &mut Vec<CodingSchemeProblem>,
) {
    let find = |id: &str| codings.iter().find(|c| c.id == id);

    if coding.derive_sources.is_empty()
        || coding.derive_sources.iter().any(|s| find(s.as_str()).is_none())
    {
        problems.push(CodingSchemeProblem::new(ProblemType::SourceMissing, coding));
    }

    let reads_no_value = coding
        .derive_sources
        .iter()
        .filter_map(|s| find(s.as_str()))
        .any(|source| source.source_type == SourceType::BaseNoValue);
    if reads_no_value {
        problems.push(CodingSchemeProblem::new(ProblemType::InvalidSource, coding));
    }

    if coding.source_type == SourceType::CopyValue {
        if coding.derive_sources.len() > 1 {
            problems.push(CodingSchemeProblem::new(ProblemType::MoreThanOneSource, coding));
        }
        let copies_derived = coding
            .derive_sources
            .iter()
            .filter_map(|s| find(s.as_str()))
            .any(|source| source.source_type != SourceType::Base);
        if copies_derived {
            problems.push(CodingSchemeProblem::new(
                ProblemType::ValueCopyNotFromBase,
                coding,
            ));
        }
    } else if coding.derive_sources.len() == 1 {
        problems.push(CodingSchemeProblem::new(ProblemType::OnlyOneSource, coding));
    }

    if coding.source_type == SourceType::Solver && !solver_references_resolve(coding, codings) {
        problems.push(CodingSchemeProblem::new(ProblemType::InvalidSource, coding));
    }
}

/// Every `${alias}` in the expression must name one of the variable's
/// derive sources.
fn solver_references_resolve(coding: &VariableCodingData, codings: &[VariableCodingData]) -> bool {
    let Some(expression) = coding.solver_expression().filter(|e| !e.trim().is_empty()) else {
        return false;
    };
    solver::placeholders(expression).iter().all(|alias| {
        codings
            .iter()
            .find(|c| c.alias_or_id() == alias)
            .or_else(|| codings.iter().find(|c| &c.id == alias))
            .is_some_and(|target| coding.derive_sources.contains(&target.id))
    })
}

/// Variables caught in (or behind) a cycle.
///
/// Variables that do not resolve because a source is missing or has no
/// value are already reported as such, and so is everything derived from
/// them.
fn check_cycles(codings: &[VariableCodingData], problems: &mut Vec<CodingSchemeProblem>) {
    let Err(EvalError::CircularDependency { unresolved }) = get_variable_dependency_tree(codings)
    else {
        return;
    };
    let unresolved: Vec<&VariableCodingData> = unresolved
        .iter()
        .filter_map(|id| codings.iter().find(|c| &c.id == id))
        .collect();

    let mut blocked: HashSet<&str> = unresolved
        .iter()
        .filter(|coding| {
            coding.derive_sources.iter().any(|s| {
                codings
                    .iter()
                    .find(|c| &c.id == s)
                    .map_or(true, |source| source.source_type == SourceType::BaseNoValue)
            })
        })
        .map(|coding| coding.id.as_str())
        .collect();
    loop {
        let before = blocked.len();
        for coding in &unresolved {
            if coding.derive_sources.iter().any(|s| blocked.contains(s.as_str())) {
                blocked.insert(coding.id.as_str());
            }
        }
        if blocked.len() == before {
            break;
        }
    }

    for coding in unresolved {
        if !blocked.contains(coding.id.as_str()) {
            problems.push(CodingSchemeProblem::new(
                ProblemType::CircularDependency,
                coding,
            ));
        }
    }
}
