//! Scorebook scheme validator.
//!
//! [`validate`] checks a coding scheme against the base variables the
//! authoring system declares and returns every problem it finds. Checks
//! are independent, so one variable may collect several problems.
//! Problems marked `breaking` make the scheme unusable for coding; the
//! rest are advisory.

pub mod codes;
pub mod problem;
pub mod sources;

pub use problem::{CodingSchemeProblem, ProblemType};

use scorebook_scheme::{VariableCodingData, VariableInfo};

/// Validate a coding scheme.
///
/// Problems are grouped by check: source problems first (in scheme
/// order, cycles last), then rule problems, then vacant variables.
pub fn validate(
    variables: &[VariableInfo],
    codings: &[VariableCodingData],
) -> Vec<CodingSchemeProblem> {
    let mut problems = sources::check_sources(variables, codings);
    problems.extend(codes::check_rules(codings));
    problems.extend(codes::check_vacant(codings));
    problems
}
