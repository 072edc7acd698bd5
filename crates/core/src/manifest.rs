//! Manifest wire types: tools, their parameters and auth requirements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_true() -> bool {
    true
}

/// A single tool parameter as declared by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Auth sources whose claims fill this parameter server-side.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_sources: Vec<String>,
    #[serde(flatten)]
    pub kind: ParameterType,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required: true,
            auth_sources: Vec::new(),
            kind,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn with_auth_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the value comes from auth claims rather than the caller.
    pub fn is_auth_param(&self) -> bool {
        !self.auth_sources.is_empty()
    }
}

/// Parameter type, tagged by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Float,
    Boolean,
    Array {
        items: Box<ItemSchema>,
    },
    Object {
        #[serde(default, rename = "additionalProperties")]
        additional_properties: AdditionalProperties,
    },
}

impl ParameterType {
    pub fn array_of(items: ParameterType) -> Self {
        Self::Array {
            items: Box::new(ItemSchema {
                description: String::new(),
                kind: items,
            }),
        }
    }

    pub fn object(additional_properties: AdditionalProperties) -> Self {
        Self::Object {
            additional_properties,
        }
    }

    /// Name used in validation messages and JSON Schema output.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
        }
    }
}

/// Element type of an array parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSchema {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(flatten)]
    pub kind: ParameterType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Integer,
    Float,
    Boolean,
}

impl From<PrimitiveType> for ParameterType {
    fn from(value: PrimitiveType) -> Self {
        match value {
            PrimitiveType::String => Self::String,
            PrimitiveType::Integer => Self::Integer,
            PrimitiveType::Float => Self::Float,
            PrimitiveType::Boolean => Self::Boolean,
        }
    }
}

/// `additionalProperties` of an object parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    /// `true` accepts any extra key, `false` rejects every extra key.
    Allowed(bool),
    /// Every extra value must have this type.
    Typed {
        #[serde(rename = "type")]
        kind: PrimitiveType,
    },
}

impl Default for AdditionalProperties {
    fn default() -> Self {
        Self::Allowed(true)
    }
}

/// A tool as declared in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchema {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
    /// Auth sources required to invoke the tool at all; any one suffices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_required: Vec<String>,
}

/// The document describing one or all tools exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub server_version: String,
    pub tools: BTreeMap<String, ToolSchema>,
}

impl Manifest {
    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();
        if self.server_version.trim().is_empty() {
            issues.push("serverVersion: must not be empty".to_string());
        }
        for (name, tool) in &self.tools {
            if name.is_empty() {
                issues.push("tools: tool name must not be empty".to_string());
            }
            for (idx, param) in tool.parameters.iter().enumerate() {
                if param.name.is_empty() {
                    issues.push(format!(
                        "tools.{name}.parameters.{idx}.name: must not be empty"
                    ));
                }
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::ManifestStructure(issues.join("; ")))
        }
    }

    /// [`Manifest::validate`] plus the non-empty description rule of the
    /// REST manifest endpoints.
    pub fn validate_with_descriptions(&self) -> Result<()> {
        self.validate()?;
        let missing: Vec<String> = self
            .tools
            .iter()
            .filter(|(_, tool)| tool.description.trim().is_empty())
            .map(|(name, _)| format!("tools.{name}.description: must not be empty"))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::ManifestStructure(missing.join("; ")))
        }
    }
}
