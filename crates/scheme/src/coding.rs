//! Variable codings: how each variable is sourced, transformed, and
//! scored.

use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Source types and processing flags
// ──────────────────────────────────────────────

/// Where a variable's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    #[default]
    Base,
    BaseNoValue,
    Manual,
    CopyValue,
    ConcatCode,
    SumCode,
    SumScore,
    UniqueValues,
    Solver,
}

impl SourceType {
    /// Base variables take their value directly from test-taker input.
    pub fn is_base(self) -> bool {
        matches!(self, SourceType::Base | SourceType::BaseNoValue)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Base => "BASE",
            SourceType::BaseNoValue => "BASE_NO_VALUE",
            SourceType::Manual => "MANUAL",
            SourceType::CopyValue => "COPY_VALUE",
            SourceType::ConcatCode => "CONCAT_CODE",
            SourceType::SumCode => "SUM_CODE",
            SourceType::SumScore => "SUM_SCORE",
            SourceType::UniqueValues => "UNIQUE_VALUES",
            SourceType::Solver => "SOLVER",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing flags, both for a variable's own value (`processing`) and
/// for how derivations read their sources (`sourceParameters.processing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Processing {
    IgnoreCase,
    IgnoreAllSpaces,
    IgnoreDispensableSpaces,
    SortArray,
    ReplayRequired,
    Attachment,
    TakeDisplayedAsValueChanged,
    TakeNotReachedAsValueChanged,
    TakeEmptyAsValid,
    Sort,
    ToNumber,
    ToLowerCase,
    RemoveAllSpaces,
    RemoveDispensableSpaces,
}

impl Processing {
    pub fn removes_all_spaces(self) -> bool {
        matches!(self, Processing::IgnoreAllSpaces | Processing::RemoveAllSpaces)
    }

    pub fn removes_dispensable_spaces(self) -> bool {
        matches!(
            self,
            Processing::IgnoreDispensableSpaces | Processing::RemoveDispensableSpaces
        )
    }

    pub fn lowers_case(self) -> bool {
        matches!(self, Processing::IgnoreCase | Processing::ToLowerCase)
    }
}

/// Extra inputs for derived variables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processing: Vec<Processing>,
}

// ──────────────────────────────────────────────
// Rules
// ──────────────────────────────────────────────

/// Matching method of a single coding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleMethod {
    Match,
    MatchRegex,
    NumericMatch,
    NumericRange,
    NumericFullRange,
    NumericLessThan,
    NumericMoreThan,
    NumericMax,
    NumericMin,
    IsEmpty,
    IsNull,
    IsTrue,
    IsFalse,
}

impl RuleMethod {
    /// Number of entries the rule's `parameters` list must carry.
    pub fn parameter_count(self) -> usize {
        match self {
            RuleMethod::IsEmpty | RuleMethod::IsNull | RuleMethod::IsTrue | RuleMethod::IsFalse => 0,
            RuleMethod::NumericRange | RuleMethod::NumericFullRange => 2,
            RuleMethod::Match
            | RuleMethod::MatchRegex
            | RuleMethod::NumericMatch
            | RuleMethod::NumericLessThan
            | RuleMethod::NumericMoreThan
            | RuleMethod::NumericMax
            | RuleMethod::NumericMin => 1,
        }
    }

    /// Methods whose parameters must parse as numbers.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            RuleMethod::NumericMatch
                | RuleMethod::NumericRange
                | RuleMethod::NumericFullRange
                | RuleMethod::NumericLessThan
                | RuleMethod::NumericMoreThan
                | RuleMethod::NumericMax
                | RuleMethod::NumericMin
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleMethod::Match => "MATCH",
            RuleMethod::MatchRegex => "MATCH_REGEX",
            RuleMethod::NumericMatch => "NUMERIC_MATCH",
            RuleMethod::NumericRange => "NUMERIC_RANGE",
            RuleMethod::NumericFullRange => "NUMERIC_FULL_RANGE",
            RuleMethod::NumericLessThan => "NUMERIC_LESS_THAN",
            RuleMethod::NumericMoreThan => "NUMERIC_MORE_THAN",
            RuleMethod::NumericMax => "NUMERIC_MAX",
            RuleMethod::NumericMin => "NUMERIC_MIN",
            RuleMethod::IsEmpty => "IS_EMPTY",
            RuleMethod::IsNull => "IS_NULL",
            RuleMethod::IsTrue => "IS_TRUE",
            RuleMethod::IsFalse => "IS_FALSE",
        }
    }
}

impl fmt::Display for RuleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fragment value meaning "any fragment".
pub const ANY_FRAGMENT: i64 = -1;

/// A single coding rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodingRule {
    pub method: RuleMethod,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<i64>,
}

impl CodingRule {
    pub fn new(method: RuleMethod, parameters: &[&str]) -> Self {
        CodingRule {
            method,
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            fragment: None,
        }
    }

    pub fn with_fragment(mut self, fragment: i64) -> Self {
        self.fragment = Some(fragment);
        self
    }

    /// Concrete fragment index, if one is addressed.
    pub fn fragment_index(&self) -> Option<usize> {
        self.fragment
            .filter(|f| *f >= 0)
            .and_then(|f| usize::try_from(f).ok())
    }

    pub fn is_any_fragment(&self) -> bool {
        self.fragment == Some(ANY_FRAGMENT)
    }
}

/// Which part of an array value a rule set inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawArrayPosition", into = "RawArrayPosition")]
pub enum ArrayPosition {
    Index(i64),
    /// Every element must satisfy the rules (more than one element required).
    Any,
    /// At least one element must satisfy the rules.
    AnyOpen,
    Sum,
    Length,
    /// Unrecognized keyword, kept for the validator to report.
    Invalid(String),
}

impl ArrayPosition {
    pub fn is_valid(&self) -> bool {
        match self {
            ArrayPosition::Index(i) => *i >= 0,
            ArrayPosition::Invalid(_) => false,
            _ => true,
        }
    }
}

impl fmt::Display for ArrayPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayPosition::Index(i) => write!(f, "{}", i),
            ArrayPosition::Any => f.write_str("ANY"),
            ArrayPosition::AnyOpen => f.write_str("ANY_OPEN"),
            ArrayPosition::Sum => f.write_str("SUM"),
            ArrayPosition::Length => f.write_str("LENGTH"),
            ArrayPosition::Invalid(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawArrayPosition {
    Index(i64),
    Keyword(String),
}

impl From<RawArrayPosition> for ArrayPosition {
    fn from(raw: RawArrayPosition) -> Self {
        match raw {
            RawArrayPosition::Index(i) => ArrayPosition::Index(i),
            RawArrayPosition::Keyword(k) => match k.as_str() {
                "ANY" => ArrayPosition::Any,
                "ANY_OPEN" => ArrayPosition::AnyOpen,
                "SUM" => ArrayPosition::Sum,
                "LENGTH" => ArrayPosition::Length,
                other => match other.parse::<i64>() {
                    Ok(i) => ArrayPosition::Index(i),
                    Err(_) => ArrayPosition::Invalid(k),
                },
            },
        }
    }
}

impl From<ArrayPosition> for RawArrayPosition {
    fn from(pos: ArrayPosition) -> Self {
        match pos {
            ArrayPosition::Index(i) => RawArrayPosition::Index(i),
            other => RawArrayPosition::Keyword(other.to_string()),
        }
    }
}

/// A group of rules combined with AND or OR.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default)]
    pub rule_operator_and: bool,
    #[serde(default)]
    pub rules: Vec<CodingRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_array_pos: Option<ArrayPosition>,
}

impl RuleSet {
    pub fn new(rules: Vec<CodingRule>) -> Self {
        RuleSet {
            rule_operator_and: false,
            rules,
            value_array_pos: None,
        }
    }

    pub fn all(mut self) -> Self {
        self.rule_operator_and = true;
        self
    }

    pub fn at(mut self, pos: ArrayPosition) -> Self {
        self.value_array_pos = Some(pos);
        self
    }
}

// ──────────────────────────────────────────────
// Codes
// ──────────────────────────────────────────────

/// Kind of a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeType {
    #[default]
    Unset,
    FullCredit,
    PartialCredit,
    ToCheck,
    NoCredit,
    Residual,
    ResidualAuto,
    IntendedIncomplete,
}

impl CodeType {
    /// Residual codes catch whatever no other code matched.
    pub fn is_residual(self) -> bool {
        matches!(self, CodeType::Residual | CodeType::ResidualAuto)
    }
}

/// Non-numeric code ids that map onto a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecialCode {
    Invalid,
    IntendedIncomplete,
}

/// A code id: a number, or one of the special status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeId {
    Number(i64),
    Special(SpecialCode),
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeId::Number(n) => write!(f, "{}", n),
            CodeId::Special(SpecialCode::Invalid) => f.write_str("INVALID"),
            CodeId::Special(SpecialCode::IntendedIncomplete) => f.write_str("INTENDED_INCOMPLETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeData {
    pub id: CodeId,
    #[serde(rename = "type", default)]
    pub code_type: CodeType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub rule_set_operator_and: bool,
    #[serde(default)]
    pub rule_sets: Vec<RuleSet>,
    #[serde(default)]
    pub manual_instruction: String,
}

impl CodeData {
    pub fn new(id: i64, score: i64, rule_sets: Vec<RuleSet>) -> Self {
        CodeData {
            id: CodeId::Number(id),
            code_type: CodeType::Unset,
            label: String::new(),
            score,
            rule_set_operator_and: false,
            rule_sets,
            manual_instruction: String::new(),
        }
    }

    pub fn residual(id: i64, score: i64) -> Self {
        let mut code = CodeData::new(id, score, Vec::new());
        code.code_type = CodeType::Residual;
        code
    }

    pub fn with_type(mut self, code_type: CodeType) -> Self {
        self.code_type = code_type;
        self
    }

    pub fn all_rule_sets(mut self) -> Self {
        self.rule_set_operator_and = true;
        self
    }
}

// ──────────────────────────────────────────────
// Variable coding
// ──────────────────────────────────────────────

/// The coding of one variable: its source, processing, and codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableCodingData {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub derive_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_parameters: Option<SourceParameters>,
    #[serde(default)]
    pub processing: Vec<Processing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragmenting: Option<String>,
    #[serde(default)]
    pub manual_instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default)]
    pub codes: Vec<CodeData>,
}

impl VariableCodingData {
    pub fn new(id: impl Into<String>, source_type: SourceType) -> Self {
        VariableCodingData {
            id: id.into(),
            alias: None,
            label: String::new(),
            source_type,
            derive_sources: Vec::new(),
            source_parameters: None,
            processing: Vec::new(),
            fragmenting: None,
            manual_instruction: String::new(),
            code_model: None,
            page: None,
            codes: Vec::new(),
        }
    }

    pub fn base(id: impl Into<String>) -> Self {
        VariableCodingData::new(id, SourceType::Base)
    }

    pub fn derived(id: impl Into<String>, source_type: SourceType, sources: &[&str]) -> Self {
        let mut coding = VariableCodingData::new(id, source_type);
        coding.derive_sources = sources.iter().map(|s| s.to_string()).collect();
        coding
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_codes(mut self, codes: Vec<CodeData>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_processing(mut self, processing: &[Processing]) -> Self {
        self.processing = processing.to_vec();
        self
    }

    pub fn with_source_processing(mut self, processing: &[Processing]) -> Self {
        self.source_parameters
            .get_or_insert_with(SourceParameters::default)
            .processing = processing.to_vec();
        self
    }

    pub fn with_solver_expression(mut self, expression: impl Into<String>) -> Self {
        self.source_parameters
            .get_or_insert_with(SourceParameters::default)
            .solver_expression = Some(expression.into());
        self
    }

    pub fn with_fragmenting(mut self, pattern: impl Into<String>) -> Self {
        self.fragmenting = Some(pattern.into());
        self
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    /// The name responses carry outwards: the alias, or the id if none.
    pub fn alias_or_id(&self) -> &str {
        self.alias.as_deref().filter(|a| !a.is_empty()).unwrap_or(&self.id)
    }

    pub fn is_base(&self) -> bool {
        self.source_type.is_base()
    }

    pub fn has_processing(&self, flag: Processing) -> bool {
        self.processing.contains(&flag)
    }

    /// Processing flags that apply when reading this variable's sources.
    pub fn source_processing(&self) -> &[Processing] {
        self.source_parameters
            .as_ref()
            .map(|p| p.processing.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_source_processing(&self, flag: Processing) -> bool {
        self.source_processing().contains(&flag)
    }

    pub fn solver_expression(&self) -> Option<&str> {
        self.source_parameters
            .as_ref()
            .and_then(|p| p.solver_expression.as_deref())
    }

    /// True if some rule set addresses array positions, or the value is
    /// split into fragments.
    pub fn is_array_aware(&self) -> bool {
        self.fragmenting.as_deref().is_some_and(|f| !f.is_empty())
            || self.codes.iter().any(|c| {
                c.rule_sets
                    .iter()
                    .any(|rs| rs.value_array_pos.is_some())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_full_coding() {
        let json = serde_json::json!({
            "id": "v1",
            "alias": "first",
            "label": "First",
            "sourceType": "BASE",
            "deriveSources": [],
            "processing": ["IGNORE_CASE", "TAKE_EMPTY_AS_VALID"],
            "manualInstruction": "",
            "codes": [
                {
                    "id": 1,
                    "type": "FULL_CREDIT",
                    "label": "",
                    "score": 1,
                    "ruleSetOperatorAnd": false,
                    "ruleSets": [
                        {
                            "ruleOperatorAnd": false,
                            "valueArrayPos": "ANY_OPEN",
                            "rules": [{ "method": "MATCH", "parameters": ["a\nb"] }]
                        }
                    ],
                    "manualInstruction": ""
                },
                { "id": "INVALID", "type": "RESIDUAL", "score": 0, "ruleSets": [] }
            ]
        });
        let coding: VariableCodingData = serde_json::from_value(json).unwrap();
        assert_eq!(coding.alias_or_id(), "first");
        assert!(coding.has_processing(Processing::IgnoreCase));
        assert_eq!(coding.codes[0].code_type, CodeType::FullCredit);
        assert_eq!(
            coding.codes[0].rule_sets[0].value_array_pos,
            Some(ArrayPosition::AnyOpen)
        );
        assert_eq!(coding.codes[1].id, CodeId::Special(SpecialCode::Invalid));
        assert!(coding.codes[1].code_type.is_residual());
        assert!(coding.is_array_aware());
    }

    #[test]
    fn array_position_keeps_unknown_keywords() {
        let pos: ArrayPosition = serde_json::from_value(serde_json::json!("FIRST")).unwrap();
        assert_eq!(pos, ArrayPosition::Invalid("FIRST".to_string()));
        assert!(!pos.is_valid());
        let pos: ArrayPosition = serde_json::from_value(serde_json::json!(2)).unwrap();
        assert_eq!(pos, ArrayPosition::Index(2));
        assert_eq!(
            serde_json::to_value(ArrayPosition::Sum).unwrap(),
            serde_json::json!("SUM")
        );
    }

    #[test]
    fn parameter_counts_per_method() {
        assert_eq!(RuleMethod::IsNull.parameter_count(), 0);
        assert_eq!(RuleMethod::NumericRange.parameter_count(), 2);
        assert_eq!(RuleMethod::MatchRegex.parameter_count(), 1);
        assert!(RuleMethod::NumericMin.is_numeric());
        assert!(!RuleMethod::Match.is_numeric());
    }

    #[test]
    fn alias_falls_back_to_id() {
        let coding = VariableCodingData::base("v9");
        assert_eq!(coding.alias_or_id(), "v9");
        let coding = VariableCodingData::base("v9").with_alias("");
        assert_eq!(coding.alias_or_id(), "v9");
    }

    #[test]
    fn fragment_selection() {
        let rule = CodingRule::new(RuleMethod::IsEmpty, &[]).with_fragment(ANY_FRAGMENT);
        assert!(rule.is_any_fragment());
        assert_eq!(rule.fragment_index(), None);
        let rule = CodingRule::new(RuleMethod::IsEmpty, &[]).with_fragment(2);
        assert_eq!(rule.fragment_index(), Some(2));
    }
}
