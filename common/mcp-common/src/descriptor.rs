//! Flat descriptions of a server's tools
//!
//! Tools publish a JSON schema for their arguments. A [`ToolDescriptor`] is
//! the same information as an ordered parameter list, which is what
//! operators and help output want to show.

use std::collections::HashSet;

use rmcp::model::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON kind of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    /// Map a JSON schema `type` to a parameter kind. Integers are numbers.
    pub fn from_schema_type(schema_type: &str) -> Option<Self> {
        match schema_type {
            "string" => Some(ParamKind::String),
            "number" | "integer" => Some(ParamKind::Number),
            "boolean" => Some(ParamKind::Boolean),
            "array" => Some(ParamKind::Array),
            "object" => Some(ParamKind::Object),
            _ => None,
        }
    }

    /// Whether `value` has this kind
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ParamKind::String, Value::String(_))
                | (ParamKind::Number, Value::Number(_))
                | (ParamKind::Boolean, Value::Bool(_))
                | (ParamKind::Array, Value::Array(_))
                | (ParamKind::Object, Value::Object(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("tool '{tool}' declares parameter '{name}' more than once")]
    DuplicateParameter { tool: String, name: String },

    #[error("required parameter '{name}' of tool '{tool}' has a default")]
    RequiredWithDefault { tool: String, name: String },
}

impl ToolDescriptor {
    /// Build a descriptor from a registered tool's input schema.
    ///
    /// Required parameters come first, each group in schema order.
    /// Properties without a usable `type` are treated as objects.
    pub fn from_tool(tool: &Tool) -> Self {
        Self::from_schema(
            tool.name.as_ref(),
            tool.description.as_deref().unwrap_or_default(),
            tool.input_schema.as_ref(),
        )
    }

    pub fn from_schema(name: &str, description: &str, schema: &Map<String, Value>) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut parameters: Vec<ParameterSpec> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(prop, schema)| parameter(prop, schema, required.contains(&prop.as_str())))
                    .collect()
            })
            .unwrap_or_default();
        parameters.sort_by_key(|p| !p.required);

        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// Check that parameter names are unique and required ones have no default
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(DescriptorError::DuplicateParameter {
                    tool: self.name.clone(),
                    name: param.name.clone(),
                });
            }
            if param.required && param.default.is_some() {
                return Err(DescriptorError::RequiredWithDefault {
                    tool: self.name.clone(),
                    name: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

fn parameter(name: &str, schema: &Value, required: bool) -> ParameterSpec {
    ParameterSpec {
        name: name.to_string(),
        kind: schema_kind(schema).unwrap_or(ParamKind::Object),
        required,
        description: schema
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        enum_values: schema
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        default: schema.get("default").cloned(),
    }
}

/// `type` may be a string or, for optional fields, `["number", "null"]`
fn schema_kind(schema: &Value) -> Option<ParamKind> {
    match schema.get("type")? {
        Value::String(t) => ParamKind::from_schema_type(t),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| *t != "null")
            .find_map(ParamKind::from_schema_type),
        _ => None,
    }
}
