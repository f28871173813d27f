//! The coding scheme: the full list of variable codings for one unit.

use serde::{Deserialize, Serialize};

use crate::coding::VariableCodingData;
use crate::error::SchemeError;
use crate::migration::CURRENT_VERSION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodingScheme {
    #[serde(default = "current_version")]
    pub version: String,
    #[serde(default)]
    pub variable_codings: Vec<VariableCodingData>,
}

fn current_version() -> String {
    CURRENT_VERSION.to_string()
}

impl CodingScheme {
    pub fn new(variable_codings: Vec<VariableCodingData>) -> Self {
        CodingScheme {
            version: current_version(),
            variable_codings,
        }
    }

    /// Parse a scheme already in the current layout.
    ///
    /// Use [`crate::migration::migrate_scheme`] for payloads that may be
    /// older.
    pub fn from_json(json: &serde_json::Value) -> Result<CodingScheme, SchemeError> {
        Ok(serde_json::from_value(json.clone())?)
    }

    pub fn coding_by_id(&self, id: &str) -> Option<&VariableCodingData> {
        self.variable_codings.iter().find(|c| c.id == id)
    }

    /// Look up a coding by its outward name (alias, falling back to id).
    pub fn coding_by_alias(&self, alias: &str) -> Option<&VariableCodingData> {
        self.variable_codings
            .iter()
            .find(|c| c.alias_or_id() == alias)
            .or_else(|| self.coding_by_id(alias))
    }

    pub fn base_codings(&self) -> impl Iterator<Item = &VariableCodingData> {
        self.variable_codings.iter().filter(|c| c.is_base())
    }

    pub fn derived_codings(&self) -> impl Iterator<Item = &VariableCodingData> {
        self.variable_codings.iter().filter(|c| !c.is_base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::SourceType;

    #[test]
    fn lookup_by_alias_and_id() {
        let scheme = CodingScheme::new(vec![
            VariableCodingData::base("01").with_alias("name"),
            VariableCodingData::derived("d1", SourceType::CopyValue, &["01"]),
        ]);
        assert_eq!(scheme.coding_by_alias("name").map(|c| c.id.as_str()), Some("01"));
        assert_eq!(scheme.coding_by_alias("01").map(|c| c.id.as_str()), Some("01"));
        assert_eq!(scheme.coding_by_alias("d1").map(|c| c.id.as_str()), Some("d1"));
        assert!(scheme.coding_by_alias("missing").is_none());
        assert_eq!(scheme.base_codings().count(), 1);
        assert_eq!(scheme.derived_codings().count(), 1);
    }

    #[test]
    fn from_json_defaults_version() {
        let scheme = CodingScheme::from_json(&serde_json::json!({
            "variableCodings": [{ "id": "a", "sourceType": "BASE" }]
        }))
        .unwrap();
        assert_eq!(scheme.version, CURRENT_VERSION);
        assert_eq!(scheme.variable_codings.len(), 1);
    }
}
