use std::fmt;

use scorebook_scheme::SourceType;

/// Errors raised by the evaluator.
///
/// The pipeline never returns these: it turns each one into a response
/// status. They surface from the lower-level entry points
/// ([`crate::get_variable_dependency_tree`], [`crate::derive_value`],
/// [`crate::try_code_response`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Derived variables whose sources never resolve.
    CircularDependency { unresolved: Vec<String> },
    /// Derivation was asked of a variable that is not derived.
    NotDerived {
        variable_id: String,
        source_type: SourceType,
    },
    /// A solver expression could not be parsed.
    SolverSyntax { expression: String, message: String },
    /// A variable's fragmenting pattern is not a valid regular expression.
    InvalidFragmentPattern { variable_id: String, message: String },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::CircularDependency { unresolved } => {
                write!(
                    f,
                    "circular dependency between derived variables: {}",
                    unresolved.join(", ")
                )
            }
            EvalError::NotDerived {
                variable_id,
                source_type,
            } => {
                write!(
                    f,
                    "variable '{}' has source type {} and cannot be derived",
                    variable_id, source_type
                )
            }
            EvalError::SolverSyntax {
                expression,
                message,
            } => {
                write!(f, "cannot solve '{}': {}", expression, message)
            }
            EvalError::InvalidFragmentPattern {
                variable_id,
                message,
            } => {
                write!(
                    f,
                    "invalid fragmenting pattern for '{}': {}",
                    variable_id, message
                )
            }
        }
    }
}

impl std::error::Error for EvalError {}
