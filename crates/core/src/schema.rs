//! Runtime validation of tool arguments against declared parameters.

use std::fmt;

use serde_json::{Map, Value, json};

use crate::manifest::{AdditionalProperties, ParameterSchema, ParameterType};

/// One step of a path into the argument payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(idx) => write!(f, "{idx}"),
        }
    }
}

/// A single offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: Vec<PathSegment>,
    pub reason: String,
}

impl ValidationIssue {
    /// Dotted path, `payload` for the root.
    pub fn dotted_path(&self) -> String {
        if self.path.is_empty() {
            return "payload".into();
        }
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.dotted_path(), self.reason)
    }
}

/// Every issue found in one payload, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationIssue>);

impl ValidationErrors {
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }

    /// Rendered `"<path>: <reason>"` lines.
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    description: String,
    required: bool,
    kind: ParameterType,
}

/// Structural validator for the caller-facing parameters of a tool.
///
/// Auth-filled parameters are never part of the surface. Keys not declared
/// by the surface are dropped from the normalized output.
#[derive(Debug, Clone, Default)]
pub struct ArgumentValidator {
    fields: Vec<Field>,
}

impl ArgumentValidator {
    pub fn new<'a>(params: impl IntoIterator<Item = &'a ParameterSchema>) -> Self {
        let fields = params
            .into_iter()
            .filter(|p| !p.is_auth_param())
            .map(|p| Field {
                name: p.name.clone(),
                description: p.description.clone(),
                required: p.required,
                kind: p.kind.clone(),
            })
            .collect();
        Self { fields }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Validate `args` and return the normalized argument object.
    ///
    /// `null` is treated as an empty object. Missing or `null` optional
    /// fields are omitted from the output.
    pub fn validate(&self, args: &Value) -> Result<Map<String, Value>, ValidationErrors> {
        let empty = Map::new();
        let obj = match args {
            Value::Object(obj) => obj,
            Value::Null => &empty,
            other => {
                return Err(ValidationErrors(vec![ValidationIssue {
                    path: Vec::new(),
                    reason: mismatch("object", other),
                }]));
            },
        };

        let mut issues = Vec::new();
        let mut normalized = Map::new();
        for field in &self.fields {
            match obj.get(&field.name) {
                None | Some(Value::Null) if !field.required => {},
                None => issues.push(ValidationIssue {
                    path: vec![PathSegment::Key(field.name.clone())],
                    reason: "Required".into(),
                }),
                Some(value) => {
                    let mut path = vec![PathSegment::Key(field.name.clone())];
                    let before = issues.len();
                    check(&field.kind, value, &mut path, &mut issues);
                    if issues.len() == before {
                        normalized.insert(field.name.clone(), value.clone());
                    }
                },
            }
        }

        if issues.is_empty() {
            Ok(normalized)
        } else {
            Err(ValidationErrors(issues))
        }
    }

    /// JSON Schema for the surface, for callers that re-expose the tool.
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let mut schema = type_schema(&f.kind);
                if !f.description.is_empty()
                    && let Value::Object(obj) = &mut schema
                {
                    obj.insert("description".into(), Value::String(f.description.clone()));
                }
                (f.name.clone(), schema)
            })
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn type_schema(kind: &ParameterType) -> Value {
    match kind {
        ParameterType::Array { items } => json!({
            "type": "array",
            "items": type_schema(&items.kind),
        }),
        ParameterType::Object {
            additional_properties,
        } => {
            let additional = match additional_properties {
                AdditionalProperties::Allowed(allowed) => Value::Bool(*allowed),
                AdditionalProperties::Typed { kind } => type_schema(&ParameterType::from(*kind)),
            };
            json!({"type": "object", "additionalProperties": additional})
        },
        other => json!({"type": other.type_name()}),
    }
}

fn received(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("Expected {expected}, received {}", received(value))
}

fn is_integral(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => true,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0),
        _ => false,
    }
}

fn fail(issues: &mut Vec<ValidationIssue>, path: &[PathSegment], reason: String) {
    issues.push(ValidationIssue {
        path: path.to_vec(),
        reason,
    });
}

fn check(
    kind: &ParameterType,
    value: &Value,
    path: &mut Vec<PathSegment>,
    issues: &mut Vec<ValidationIssue>,
) {
    match kind {
        ParameterType::String if !value.is_string() => {
            fail(issues, path, mismatch("string", value));
        },
        ParameterType::Boolean if !value.is_boolean() => {
            fail(issues, path, mismatch("boolean", value));
        },
        ParameterType::Float if !value.is_number() => {
            fail(issues, path, mismatch("number", value));
        },
        ParameterType::Integer if value.is_number() && !is_integral(value) => {
            fail(issues, path, "Expected integer, received float".into());
        },
        ParameterType::Integer if !value.is_number() => {
            fail(issues, path, mismatch("integer", value));
        },
        ParameterType::Array { items } => {
            let Some(elements) = value.as_array() else {
                fail(issues, path, mismatch("array", value));
                return;
            };
            for (idx, element) in elements.iter().enumerate() {
                path.push(PathSegment::Index(idx));
                check(&items.kind, element, path, issues);
                path.pop();
            }
        },
        ParameterType::Object {
            additional_properties,
        } => {
            let Some(obj) = value.as_object() else {
                fail(issues, path, mismatch("object", value));
                return;
            };
            match additional_properties {
                AdditionalProperties::Allowed(true) => {},
                AdditionalProperties::Allowed(false) => {
                    if !obj.is_empty() {
                        let keys: Vec<String> = obj.keys().map(|k| format!("'{k}'")).collect();
                        fail(
                            issues,
                            path,
                            format!("Unrecognized key(s) in object: {}", keys.join(", ")),
                        );
                    }
                },
                AdditionalProperties::Typed { kind } => {
                    let kind = ParameterType::from(*kind);
                    for (key, entry) in obj {
                        path.push(PathSegment::Key(key.clone()));
                        check(&kind, entry, path, issues);
                        path.pop();
                    }
                },
            }
        },
        _ => {},
    }
}
