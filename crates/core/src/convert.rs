//! Conversion of MCP tool descriptions to manifests, and reassembly of
//! `tools/call` content.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{
    manifest::{
        AdditionalProperties, ItemSchema, Manifest, ParameterSchema, ParameterType, PrimitiveType,
        ToolSchema,
    },
    types::{META_AUTH_INVOKE, META_AUTH_PARAM, McpToolDef, ToolContent},
};

/// Build a manifest from a `tools/list` result.
pub fn manifest_from_tools(server_version: &str, tools: &[McpToolDef]) -> Manifest {
    Manifest {
        server_version: server_version.to_string(),
        tools: tools
            .iter()
            .map(|def| (def.name.clone(), tool_schema(def)))
            .collect(),
    }
}

fn tool_schema(def: &McpToolDef) -> ToolSchema {
    let meta = def.meta.as_ref();
    let auth_params = meta
        .and_then(|m| m.get(META_AUTH_PARAM))
        .and_then(Value::as_object);
    let auth_invoke = meta
        .and_then(|m| m.get(META_AUTH_INVOKE))
        .map(string_list)
        .unwrap_or_default();

    let required: Vec<&str> = def
        .input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let parameters = def
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| ParameterSchema {
                    name: name.clone(),
                    description: description(prop),
                    required: required.contains(&name.as_str()),
                    auth_sources: auth_params
                        .and_then(|a| a.get(name))
                        .map(string_list)
                        .unwrap_or_default(),
                    kind: parameter_type(prop),
                })
                .collect()
        })
        .unwrap_or_default();

    ToolSchema {
        description: def.description.clone().unwrap_or_default(),
        parameters,
        auth_required: auth_invoke,
    }
}

fn description(schema: &Value) -> String {
    schema
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn primitive(name: &str) -> Option<PrimitiveType> {
    match name {
        "string" => Some(PrimitiveType::String),
        "integer" => Some(PrimitiveType::Integer),
        "number" | "float" => Some(PrimitiveType::Float),
        "boolean" => Some(PrimitiveType::Boolean),
        _ => None,
    }
}

/// JSON Schema property to parameter type. Anything unrecognised is a
/// string; arrays without items hold strings; objects without
/// `additionalProperties` are open.
fn parameter_type(schema: &Value) -> ParameterType {
    match schema.get("type").and_then(Value::as_str) {
        Some("array") => {
            let items = schema.get("items");
            ParameterType::Array {
                items: Box::new(ItemSchema {
                    description: items.map(description).unwrap_or_default(),
                    kind: items.map(parameter_type).unwrap_or(ParameterType::String),
                }),
            }
        },
        Some("object") => {
            let additional_properties = match schema.get("additionalProperties") {
                Some(Value::Bool(allowed)) => AdditionalProperties::Allowed(*allowed),
                Some(typed) => typed
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(primitive)
                    .map(|kind| AdditionalProperties::Typed { kind })
                    .unwrap_or_default(),
                None => AdditionalProperties::default(),
            };
            ParameterType::Object {
                additional_properties,
            }
        },
        Some(other) => primitive(other).map_or(ParameterType::String, ParameterType::from),
        None => ParameterType::String,
    }
}

/// Reassemble the text chunks of a `tools/call` result.
///
/// Non-text chunks are dropped. No text yields `"null"`, one chunk is
/// returned verbatim. Several chunks that are all JSON objects are joined
/// into a JSON array of their original text; otherwise they are
/// concatenated.
pub fn merge_text_content(content: &[ToolContent]) -> String {
    let texts: Vec<&str> = content
        .iter()
        .filter_map(|chunk| match chunk {
            ToolContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    match texts.as_slice() {
        [] => "null".to_string(),
        [single] => (*single).to_string(),
        many if many.iter().all(|t| is_json_object(t)) => format!("[{}]", many.join(",")),
        many => many.concat(),
    }
}

fn is_json_object(text: &str) -> bool {
    matches!(serde_json::from_str::<Value>(text), Ok(Value::Object(_)))
}

/// Auth requirements per parameter, as consumed by [`crate::auth::resolve`].
pub fn param_auth_map(params: &[ParameterSchema]) -> BTreeMap<String, Vec<String>> {
    params
        .iter()
        .filter(|p| p.is_auth_param())
        .map(|p| (p.name.clone(), p.auth_sources.clone()))
        .collect()
}
