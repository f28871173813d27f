//! Coding rule evaluation.
//!
//! Three layers: [`check_one_value`] tests one scalar against one rule,
//! [`is_match_rule`] adds array and fragment addressing, and
//! [`is_match_rule_set`] resolves a rule set's array position before
//! combining its rules with AND or OR.
//!
//! Nothing here fails: malformed parameters or patterns simply do not
//! match.

use fancy_regex::RegexBuilder;
use scorebook_scheme::{ArrayPosition, CodingRule, Processing, ResponseValue, RuleMethod, RuleSet};

use crate::transform::{
    get_value_as_number, get_value_as_string, is_empty_value, normalize_string, parse_number,
};

/// Test a single scalar value against a rule.
pub fn check_one_value(value: &ResponseValue, rule: &CodingRule, processing: &[Processing]) -> bool {
    match rule.method {
        RuleMethod::IsNull => value.is_null(),
        RuleMethod::IsEmpty => is_empty_value(value),
        RuleMethod::IsTrue => is_true(value),
        RuleMethod::IsFalse => is_false(value),
        RuleMethod::Match => {
            let Some(actual) = get_value_as_string(value, processing) else {
                return false;
            };
            parameter_lines(rule).any(|line| normalize_string(line, processing) == actual)
        }
        RuleMethod::MatchRegex => {
            let Some(actual) = get_value_as_string(value, processing) else {
                return false;
            };
            let ignore_case = processing.contains(&Processing::IgnoreCase);
            parameter_lines(rule)
                .filter(|line| !line.is_empty())
                .any(|line| {
                    RegexBuilder::new(line)
                        .case_insensitive(ignore_case)
                        .build()
                        .ok()
                        .and_then(|re| re.is_match(&actual).ok())
                        .unwrap_or(false)
                })
        }
        RuleMethod::NumericMatch => {
            let Some(actual) = get_value_as_number(value) else {
                return false;
            };
            parameter_lines(rule)
                .filter(|line| !line.trim().is_empty())
                .filter_map(parse_number)
                .any(|p| p == actual)
        }
        RuleMethod::NumericLessThan => compare_with(value, rule, |v, p| v < p),
        RuleMethod::NumericMoreThan => compare_with(value, rule, |v, p| v > p),
        RuleMethod::NumericMax => compare_with(value, rule, |v, p| v <= p),
        RuleMethod::NumericMin => compare_with(value, rule, |v, p| v >= p),
        RuleMethod::NumericRange => {
            match (get_value_as_number(value), parameter(rule, 0), parameter(rule, 1)) {
                (Some(v), Some(lower), Some(upper)) => v > lower && v <= upper,
                _ => false,
            }
        }
        RuleMethod::NumericFullRange => {
            match (get_value_as_number(value), parameter(rule, 0), parameter(rule, 1)) {
                (Some(v), Some(lower), Some(upper)) => v >= lower && v <= upper,
                _ => false,
            }
        }
    }
}

/// Each parameter may hold several alternatives, one per line.
fn parameter_lines(rule: &CodingRule) -> impl Iterator<Item = &str> {
    rule.parameters
        .iter()
        .flat_map(|p| p.split('\n'))
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn parameter(rule: &CodingRule, index: usize) -> Option<f64> {
    rule.parameters
        .get(index)
        .filter(|p| !p.trim().is_empty())
        .and_then(|p| parse_number(p))
}

fn compare_with(value: &ResponseValue, rule: &CodingRule, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (get_value_as_number(value), parameter(rule, 0)) {
        (Some(v), Some(p)) => cmp(v, p),
        _ => false,
    }
}

fn is_true(value: &ResponseValue) -> bool {
    match value {
        ResponseValue::Bool(b) => *b,
        ResponseValue::Number(n) => *n == 1.0,
        ResponseValue::String(s) => s == "1" || s == "true",
        _ => false,
    }
}

fn is_false(value: &ResponseValue) -> bool {
    match value {
        ResponseValue::Bool(b) => !*b,
        ResponseValue::Number(n) => *n == 0.0,
        ResponseValue::String(s) => s == "0" || s == "false",
        _ => false,
    }
}

/// Test a value that may be an array against a rule.
///
/// With `is_value_array`, the rule matches if any member matches; a
/// member that is itself an array (fragments) is resolved through the
/// rule's fragment index, or any fragment when none is given. An empty
/// array is tested as `''`. Without `is_value_array`, a fragment index on
/// a flat array selects that element.
pub fn is_match_rule(
    value: &ResponseValue,
    rule: &CodingRule,
    is_value_array: bool,
    processing: &[Processing],
) -> bool {
    match value {
        ResponseValue::Array(items) if is_value_array => {
            if items.is_empty() {
                return check_one_value(&ResponseValue::String(String::new()), rule, processing);
            }
            items.iter().any(|item| match item {
                ResponseValue::Array(fragments) => match_fragment(fragments, rule, processing)
                    .unwrap_or_else(|| {
                        fragments
                            .iter()
                            .any(|f| check_one_value(f, rule, processing))
                    }),
                scalar => check_one_value(scalar, rule, processing),
            })
        }
        ResponseValue::Array(items) => match_fragment(items, rule, processing)
            .unwrap_or_else(|| check_one_value(value, rule, processing)),
        scalar => check_one_value(scalar, rule, processing),
    }
}

/// Apply a rule to the fragment(s) it addresses; `None` if it addresses none.
fn match_fragment(
    fragments: &[ResponseValue],
    rule: &CodingRule,
    processing: &[Processing],
) -> Option<bool> {
    if let Some(index) = rule.fragment_index() {
        return Some(
            fragments
                .get(index)
                .is_some_and(|f| check_one_value(f, rule, processing)),
        );
    }
    if rule.is_any_fragment() {
        return Some(
            fragments
                .iter()
                .any(|f| check_one_value(f, rule, processing)),
        );
    }
    None
}

/// Test a value against a rule set.
pub fn is_match_rule_set(
    value: &ResponseValue,
    rule_set: &RuleSet,
    is_value_array: bool,
    processing: &[Processing],
) -> bool {
    if rule_set.rules.is_empty() {
        return false;
    }

    let items = value.as_array();
    let (target, target_is_array) = match (&rule_set.value_array_pos, items) {
        (Some(ArrayPosition::Index(i)), Some(items)) => {
            // Out-of-range positions fall back to the whole array.
            match usize::try_from(*i).ok().and_then(|i| items.get(i)) {
                Some(item) => (item.clone(), false),
                None => (value.clone(), is_value_array),
            }
        }
        (Some(ArrayPosition::Sum), Some(items)) => (ResponseValue::Number(sum_values(items)), false),
        (Some(ArrayPosition::Length), Some(items)) => {
            (ResponseValue::Number(items.len() as f64), false)
        }
        _ => (value.clone(), is_value_array),
    };

    if !rules_match(&target, rule_set, target_is_array, processing) {
        return false;
    }

    match (&rule_set.value_array_pos, items) {
        (Some(ArrayPosition::Any), Some(items)) if items.len() > 1 => items
            .iter()
            .all(|item| all_rules_match(item, rule_set, processing)),
        (Some(ArrayPosition::AnyOpen), Some(items)) if !items.is_empty() => items
            .iter()
            .any(|item| all_rules_match(item, rule_set, processing)),
        _ => true,
    }
}

fn rules_match(
    value: &ResponseValue,
    rule_set: &RuleSet,
    is_value_array: bool,
    processing: &[Processing],
) -> bool {
    let mut results = rule_set
        .rules
        .iter()
        .map(|rule| is_match_rule(value, rule, is_value_array, processing));
    if rule_set.rule_operator_and {
        results.all(|m| m)
    } else {
        results.any(|m| m)
    }
}

fn all_rules_match(item: &ResponseValue, rule_set: &RuleSet, processing: &[Processing]) -> bool {
    rule_set
        .rules
        .iter()
        .all(|rule| is_match_rule(item, rule, false, processing))
}

/// Sum of numeric-coerced members, one level deep; non-numeric members count 0.
fn sum_values(items: &[ResponseValue]) -> f64 {
    items
        .iter()
        .map(|item| match item {
            ResponseValue::Array(inner) => inner
                .iter()
                .filter_map(get_value_as_number)
                .sum::<f64>(),
            scalar => get_value_as_number(scalar).unwrap_or(0.0),
        })
        .sum()
}
