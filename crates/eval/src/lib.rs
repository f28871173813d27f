//! Scorebook evaluator: codes test-taker responses against a coding
//! scheme and derives the values of computed variables.
//!
//! The entry point is [`code`], which takes a unit's responses and the
//! scheme's variable codings and returns one coded response per variable.
//! The building blocks are public as well:
//! - [`code_response`] codes a single response against its variable's codes
//! - [`derive_value`] computes one derived variable from its sources
//! - [`get_variable_dependency_tree`] orders variables by dependency level
//! - [`get_base_vars_list`] expands derived variables to their base inputs

pub mod coder;
pub mod derive;
pub mod error;
pub mod graph;
pub mod options;
pub mod pipeline;
pub mod rule;
pub mod solver;
pub mod transform;

pub use coder::{code_response, transform_value, try_code_response};
pub use derive::derive_value;
pub use error::EvalError;
pub use graph::{get_base_vars_list, get_variable_dependency_tree, VariableGraphNode};
pub use options::{CodingFailure, CodingOptions, FailureStage};
pub use pipeline::code;
pub use rule::{check_one_value, is_match_rule, is_match_rule_set};
pub use transform::{get_value_as_number, get_value_as_string};
