//! Dependency levels for derived variables.
//!
//! Base variables sit at level 0; a derived variable sits one level above
//! the highest of its sources. Levels are assigned in passes until no
//! further variable resolves; whatever is left over depends on a cycle
//! (or on a source that does not exist).

use std::collections::{HashMap, HashSet};

use scorebook_scheme::{SourceType, VariableCodingData};
use serde::Serialize;

use crate::error::EvalError;

/// A variable placed in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableGraphNode {
    pub id: String,
    pub level: usize,
    pub sources: Vec<String>,
    pub page: String,
}

/// Nodes that resolved, plus the ids of derived variables that did not.
#[derive(Debug, Clone, Default)]
pub(crate) struct DependencyLevels {
    pub nodes: Vec<VariableGraphNode>,
    pub unresolved: Vec<String>,
}

pub(crate) fn assign_levels(codings: &[VariableCodingData]) -> DependencyLevels {
    let mut nodes: Vec<VariableGraphNode> = codings
        .iter()
        .filter(|c| c.source_type == SourceType::Base)
        .map(|c| VariableGraphNode {
            id: c.id.clone(),
            level: 0,
            sources: Vec::new(),
            page: c.page.clone().unwrap_or_default(),
        })
        .collect();
    let mut resolved: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    let mut pending: Vec<&VariableCodingData> = codings.iter().filter(|c| !c.is_base()).collect();

    loop {
        let before = pending.len();
        let mut still_pending = Vec::with_capacity(pending.len());
        for coding in pending {
            let parents: Option<Vec<usize>> = coding
                .derive_sources
                .iter()
                .map(|s| resolved.get(s).copied())
                .collect();
            let Some(parents) = parents else {
                still_pending.push(coding);
                continue;
            };

            let level = parents
                .iter()
                .map(|&i| nodes[i].level)
                .max()
                .unwrap_or(0)
                + 1;
            let mut pages = parents.iter().map(|&i| nodes[i].page.as_str());
            let page = match pages.next() {
                Some(first) if pages.all(|p| p == first) => first.to_string(),
                _ => String::new(),
            };

            resolved.insert(coding.id.clone(), nodes.len());
            nodes.push(VariableGraphNode {
                id: coding.id.clone(),
                level,
                sources: coding.derive_sources.clone(),
                page,
            });
        }
        pending = still_pending;
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    DependencyLevels {
        nodes,
        unresolved: pending.iter().map(|c| c.id.clone()).collect(),
    }
}

/// Assign every base and derived variable a dependency level.
///
/// `BASE_NO_VALUE` variables are not part of the graph. Fails if some
/// derived variable can never resolve.
pub fn get_variable_dependency_tree(
    codings: &[VariableCodingData],
) -> Result<Vec<VariableGraphNode>, EvalError> {
    let levels = assign_levels(codings);
    if !levels.unresolved.is_empty() {
        return Err(EvalError::CircularDependency {
            unresolved: levels.unresolved,
        });
    }
    Ok(levels.nodes)
}

/// Expand aliases through their derive sources down to base variables.
///
/// Returns the base variables' aliases (ids where no alias is set), each
/// once, in first-seen order. Unknown aliases contribute nothing.
pub fn get_base_vars_list(aliases: &[String], codings: &[VariableCodingData]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    for alias in aliases {
        let coding = codings
            .iter()
            .find(|c| c.alias_or_id() == alias)
            .or_else(|| codings.iter().find(|c| &c.id == alias));
        if let Some(coding) = coding {
            collect_base_vars(coding, codings, &mut visited, &mut found);
        }
    }
    found
}

fn collect_base_vars<'a>(
    coding: &'a VariableCodingData,
    codings: &'a [VariableCodingData],
    visited: &mut HashSet<&'a str>,
    found: &mut Vec<String>,
) {
    if !visited.insert(coding.id.as_str()) {
        return;
    }
    if coding.source_type == SourceType::Base {
        let name = coding.alias_or_id().to_string();
        if !found.contains(&name) {
            found.push(name);
        }
        return;
    }
    for source in &coding.derive_sources {
        if let Some(source_coding) = codings.iter().find(|c| &c.id == source) {
            collect_base_vars(source_coding, codings, visited, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn derived(id: &str, sources: &[&str]) -> VariableCodingData {
        VariableCodingData::derived(id, SourceType::SumCode, sources)
    }

    #[test]
    fn levels_follow_sources() {
        let codings = vec![
            derived("top", &["mid", "a"]),
            VariableCodingData::base("a"),
            derived("mid", &["a", "b"]),
            VariableCodingData::base("b"),
        ];
        let nodes = get_variable_dependency_tree(&codings).unwrap();
        let level = |id: &str| nodes.iter().find(|n| n.id == id).unwrap().level;
        assert_eq!(level("a"), 0);
        assert_eq!(level("b"), 0);
        assert_eq!(level("mid"), 1);
        assert_eq!(level("top"), 2);
        assert_eq!(nodes.len(), 4);
    }

    #[test]
    fn base_no_value_is_not_a_node() {
        let codings = vec![
            VariableCodingData::base("a"),
            VariableCodingData::new("btn", SourceType::BaseNoValue),
        ];
        let nodes = get_variable_dependency_tree(&codings).unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn cycle_is_an_error() {
        let codings = vec![derived("a", &["b"]), derived("b", &["a"])];
        match get_variable_dependency_tree(&codings) {
            Err(EvalError::CircularDependency { unresolved }) => {
                assert_eq!(unresolved, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected circular dependency, got {:?}", other),
        }
    }

    #[test]
    fn shared_page_is_inherited() {
        let codings = vec![
            VariableCodingData::base("a").with_page("1"),
            VariableCodingData::base("b").with_page("1"),
            VariableCodingData::base("c").with_page("2"),
            derived("same", &["a", "b"]),
            derived("mixed", &["a", "c"]),
        ];
        let nodes = get_variable_dependency_tree(&codings).unwrap();
        let page = |id: &str| nodes.iter().find(|n| n.id == id).unwrap().page.clone();
        assert_eq!(page("same"), "1");
        assert_eq!(page("mixed"), "");
    }

    #[test]
    fn base_vars_expand_through_derivations() {
        let codings = vec![
            VariableCodingData::base("01").with_alias("first"),
            VariableCodingData::base("02"),
            derived("d1", &["01", "02"]).with_alias("sum"),
            derived("d2", &["d1", "01"]),
        ];
        let bases = get_base_vars_list(&["d2".to_string()], &codings);
        assert_eq!(bases, vec!["first".to_string(), "02".to_string()]);
        let bases = get_base_vars_list(&["sum".to_string(), "first".to_string()], &codings);
        assert_eq!(bases, vec!["first".to_string(), "02".to_string()]);
        assert!(get_base_vars_list(&["nope".to_string()], &codings).is_empty());
    }

    proptest! {
        #[test]
        fn derived_levels_exceed_source_levels(edges in proptest::collection::vec(
            proptest::collection::vec(any::<prop::sample::Index>(), 1..4), 1..12)) {
            // Variable i may only draw from variables with a lower index: always acyclic.
            let mut codings = vec![VariableCodingData::base("v0")];
            for (i, sources) in edges.iter().enumerate() {
                let id = format!("v{}", i + 1);
                let picked: Vec<String> = sources.iter().map(|s| format!("v{}", s.index(i + 1))).collect();
                let mut coding = VariableCodingData::new(id, SourceType::ConcatCode);
                coding.derive_sources = picked;
                codings.push(coding);
            }
            let nodes = get_variable_dependency_tree(&codings).unwrap();
            prop_assert_eq!(nodes.len(), codings.len());
            for node in &nodes {
                for source in &node.sources {
                    let parent = nodes.iter().find(|n| &n.id == source).unwrap();
                    prop_assert!(node.level > parent.level);
                }
            }
        }
    }
}
