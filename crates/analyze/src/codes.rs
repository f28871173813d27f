//! Checks on variables' codes: rule parameters and uncoded variables.

use fancy_regex::Regex;
use scorebook_eval::transform::parse_number;
use scorebook_scheme::{CodeData, CodingRule, RuleMethod, SourceType, VariableCodingData};

use crate::problem::{CodingSchemeProblem, ProblemType};

/// One problem per code with a malformed rule or rule set.
pub fn check_rules(codings: &[VariableCodingData]) -> Vec<CodingSchemeProblem> {
    let mut problems = Vec::new();
    for coding in codings {
        for code in &coding.codes {
            if !code_is_well_formed(code) {
                problems.push(CodingSchemeProblem::for_code(
                    ProblemType::RuleParameterCountMismatch,
                    coding,
                    code.id,
                ));
            }
        }
    }
    problems
}

/// Variables without codes that no COPY_VALUE variable takes over.
pub fn check_vacant(codings: &[VariableCodingData]) -> Vec<CodingSchemeProblem> {
    codings
        .iter()
        .filter(|c| c.source_type != SourceType::BaseNoValue && c.codes.is_empty())
        .filter(|c| {
            !codings.iter().any(|other| {
                other.source_type == SourceType::CopyValue && other.derive_sources.contains(&c.id)
            })
        })
        .map(|c| CodingSchemeProblem::new(ProblemType::Vacant, c))
        .collect()
}

fn code_is_well_formed(code: &CodeData) -> bool {
    code.rule_sets.iter().all(|rule_set| {
        rule_set
            .value_array_pos
            .as_ref()
            .map_or(true, |pos| pos.is_valid())
            && rule_set.rules.iter().all(rule_is_well_formed)
    })
}

fn rule_is_well_formed(rule: &CodingRule) -> bool {
    let expected = rule.method.parameter_count();
    let params = &rule.parameters;

    if expected == 0 {
        return params.iter().all(|p| p.trim().is_empty());
    }
    if params.len() != expected {
        return false;
    }

    match rule.method {
        RuleMethod::Match => true,
        RuleMethod::MatchRegex => {
            let mut patterns = params[0].lines().filter(|l| !l.is_empty()).peekable();
            patterns.peek().is_some() && patterns.all(|p| Regex::new(p).is_ok())
        }
        RuleMethod::NumericMatch => {
            let mut values = params[0].lines().filter(|l| !l.trim().is_empty()).peekable();
            values.peek().is_some() && values.all(|v| parse_number(v).is_some())
        }
        RuleMethod::NumericRange | RuleMethod::NumericFullRange => {
            match (number(&params[0]), number(&params[1])) {
                (Some(low), Some(high)) if rule.method == RuleMethod::NumericRange => low < high,
                (Some(low), Some(high)) => low <= high,
                _ => false,
            }
        }
        _ => number(&params[0]).is_some(),
    }
}

fn number(param: &str) -> Option<f64> {
    if param.trim().is_empty() {
        return None;
    }
    parse_number(param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorebook_scheme::{ArrayPosition, CodeId, RuleSet};

    fn coding_with_rule(rule: CodingRule) -> VariableCodingData {
        VariableCodingData::base("v").with_codes(vec![CodeData::new(
            7,
            1,
            vec![RuleSet::new(vec![rule])],
        )])
    }

    fn flags(rule: CodingRule) -> bool {
        !check_rules(&[coding_with_rule(rule)]).is_empty()
    }

    #[test]
    fn parameter_counts() {
        assert!(!flags(CodingRule::new(RuleMethod::Match, &["a\nb"])));
        assert!(flags(CodingRule::new(RuleMethod::Match, &[])));
        assert!(flags(CodingRule::new(RuleMethod::NumericRange, &["1"])));
        assert!(!flags(CodingRule::new(RuleMethod::IsEmpty, &[])));
        assert!(flags(CodingRule::new(RuleMethod::IsTrue, &["x"])));
    }

    #[test]
    fn parameter_contents() {
        assert!(flags(CodingRule::new(RuleMethod::MatchRegex, &["("])));
        assert!(!flags(CodingRule::new(RuleMethod::MatchRegex, &["^a+$\n\nb"])));
        assert!(!flags(CodingRule::new(RuleMethod::MatchRegex, &["^(?!no$).+$"])));
        assert!(!flags(CodingRule::new(RuleMethod::MatchRegex, &["^(a)\\1$"])));
        assert!(flags(CodingRule::new(RuleMethod::NumericMin, &["ten"])));
        assert!(flags(CodingRule::new(RuleMethod::NumericMax, &[""])));
        assert!(!flags(CodingRule::new(RuleMethod::NumericLessThan, &["2,5"])));
        assert!(!flags(CodingRule::new(RuleMethod::NumericMatch, &["1\n2"])));
        assert!(flags(CodingRule::new(RuleMethod::NumericMatch, &["1\nx"])));
    }

    #[test]
    fn inverted_ranges() {
        assert!(flags(CodingRule::new(RuleMethod::NumericRange, &["5", "1"])));
        assert!(flags(CodingRule::new(RuleMethod::NumericRange, &["3", "3"])));
        assert!(!flags(CodingRule::new(RuleMethod::NumericFullRange, &["3", "3"])));
        assert!(flags(CodingRule::new(RuleMethod::NumericFullRange, &["4", "3"])));
    }

    #[test]
    fn invalid_array_positions() {
        let code = CodeData::new(
            2,
            0,
            vec![RuleSet::new(vec![CodingRule::new(RuleMethod::IsNull, &[])])
                .at(ArrayPosition::Invalid("FIRST".to_string()))],
        );
        let coding = VariableCodingData::base("v").with_codes(vec![code]);
        let problems = check_rules(&[coding]);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].code, Some(CodeId::Number(2)));
        assert!(problems[0].breaking);
    }

    #[test]
    fn vacancy() {
        let codings = vec![
            VariableCodingData::base("plain"),
            VariableCodingData::base("copied"),
            VariableCodingData::new("button", SourceType::BaseNoValue),
            VariableCodingData::derived("copy", SourceType::CopyValue, &["copied"]),
            coding_with_rule(CodingRule::new(RuleMethod::IsNull, &[])),
        ];
        let ids: Vec<String> = check_vacant(&codings)
            .into_iter()
            .map(|p| p.variable_id)
            .collect();
        assert_eq!(ids, vec!["plain".to_string(), "copy".to_string()]);
    }
}
