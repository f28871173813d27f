//! Base variable descriptions supplied by the authoring system.
//!
//! Only the scheme validator consumes these; the evaluator never needs
//! them.

use serde::{Deserialize, Serialize};

use crate::response::ResponseValue;

/// Declared type of a base variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Attachment,
    Json,
    NoValue,
}

/// An enumerated value a variable may take.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableValue {
    #[serde(default)]
    pub value: ResponseValue,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "type", default)]
    pub variable_type: VariableType,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub values: Vec<VariableValue>,
    #[serde(default)]
    pub value_position_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

impl VariableInfo {
    pub fn new(id: impl Into<String>, variable_type: VariableType) -> Self {
        VariableInfo {
            id: id.into(),
            alias: None,
            variable_type,
            format: String::new(),
            multiple: false,
            nullable: false,
            values: Vec::new(),
            value_position_labels: Vec::new(),
            page: None,
        }
    }

    pub fn alias_or_id(&self) -> &str {
        self.alias.as_deref().filter(|a| !a.is_empty()).unwrap_or(&self.id)
    }

    pub fn is_no_value(&self) -> bool {
        self.variable_type == VariableType::NoValue
    }
}
