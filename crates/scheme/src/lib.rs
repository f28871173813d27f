//! scorebook-scheme: shared coding scheme and response types.
//!
//! Typed structs for responses, variable codings, codes, rule sets,
//! and the base variable descriptions the validator consumes. All types
//! (de)serialize to the camelCase JSON the authoring and test-taking
//! systems exchange. Legacy payloads go through [`migrate_scheme`].

pub mod coding;
pub mod error;
pub mod migration;
pub mod response;
pub mod scheme;
pub mod variable_info;

pub use coding::{
    ArrayPosition, CodeData, CodeId, CodeType, CodingRule, Processing, RuleMethod, RuleSet,
    SourceParameters, SourceType, SpecialCode, VariableCodingData, ANY_FRAGMENT,
};
pub use error::SchemeError;
pub use migration::{migrate_scheme, CURRENT_VERSION};
pub use response::{Response, ResponseStatus, ResponseValue};
pub use scheme::CodingScheme;
pub use variable_info::{VariableInfo, VariableType, VariableValue};
