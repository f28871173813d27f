//! Problems found in a coding scheme.

use scorebook_scheme::{CodeId, VariableCodingData};
use serde::Serialize;
use std::fmt;

/// Kind of a scheme problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemType {
    InvalidSource,
    SourceMissing,
    MoreThanOneSource,
    ValueCopyNotFromBase,
    OnlyOneSource,
    RuleParameterCountMismatch,
    Vacant,
    CircularDependency,
}

impl ProblemType {
    /// Breaking problems make the scheme unusable for coding.
    pub fn is_breaking(self) -> bool {
        matches!(
            self,
            ProblemType::InvalidSource
                | ProblemType::SourceMissing
                | ProblemType::RuleParameterCountMismatch
                | ProblemType::CircularDependency
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProblemType::InvalidSource => "INVALID_SOURCE",
            ProblemType::SourceMissing => "SOURCE_MISSING",
            ProblemType::MoreThanOneSource => "MORE_THAN_ONE_SOURCE",
            ProblemType::ValueCopyNotFromBase => "VALUE_COPY_NOT_FROM_BASE",
            ProblemType::OnlyOneSource => "ONLY_ONE_SOURCE",
            ProblemType::RuleParameterCountMismatch => "RULE_PARAMETER_COUNT_MISMATCH",
            ProblemType::Vacant => "VACANT",
            ProblemType::CircularDependency => "CIRCULAR_DEPENDENCY",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem attached to a variable (and, for rule problems, a code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodingSchemeProblem {
    #[serde(rename = "type")]
    pub problem_type: ProblemType,
    pub breaking: bool,
    pub variable_id: String,
    pub variable_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeId>,
}

impl CodingSchemeProblem {
    pub fn new(problem_type: ProblemType, coding: &VariableCodingData) -> Self {
        CodingSchemeProblem {
            problem_type,
            breaking: problem_type.is_breaking(),
            variable_id: coding.id.clone(),
            variable_label: coding.label.clone(),
            code: None,
        }
    }

    pub fn for_code(problem_type: ProblemType, coding: &VariableCodingData, code: CodeId) -> Self {
        CodingSchemeProblem {
            code: Some(code),
            ..CodingSchemeProblem::new(problem_type, coding)
        }
    }
}
