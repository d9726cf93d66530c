//! Declarative parameter schemas for commands.
//!
//! A small JSON-Schema subset: enough to describe a command's arguments to
//! the model and to type-check the arguments the model sends back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The JSON type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema for one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// Element schema when `schema_type` is `Array`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,

    /// Field schemas when `schema_type` is `Object`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonSchema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl JsonSchema {
    pub fn new(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            description: None,
            required: false,
            items: None,
            properties: BTreeMap::new(),
            enum_values: None,
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    pub fn integer() -> Self {
        Self::new(SchemaType::Integer)
    }

    pub fn number() -> Self {
        Self::new(SchemaType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    pub fn array(items: JsonSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaType::Array)
        }
    }

    pub fn object() -> Self {
        Self::new(SchemaType::Object)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: JsonSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Render as a standard JSON Schema document.
    pub fn to_json(&self) -> Value {
        let mut out = serde_json::Map::new();
        out.insert("type".into(), json!(self.schema_type.as_str()));
        if let Some(desc) = &self.description {
            out.insert("description".into(), json!(desc));
        }
        if let Some(values) = &self.enum_values {
            out.insert("enum".into(), Value::Array(values.clone()));
        }
        if let Some(items) = &self.items {
            out.insert("items".into(), items.to_json());
        }
        if self.schema_type == SchemaType::Object {
            let props: serde_json::Map<String, Value> = self
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            let required: Vec<&String> = self
                .properties
                .iter()
                .filter(|(_, v)| v.required)
                .map(|(k, _)| k)
                .collect();
            out.insert("properties".into(), Value::Object(props));
            if !required.is_empty() {
                out.insert("required".into(), json!(required));
            }
        }
        Value::Object(out)
    }

    /// Check `value` against this schema.
    ///
    /// Returns one message per offending field, prefixed with its path.
    pub fn validate(&self, path: &str, value: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        self.validate_into(path, value, &mut problems);
        problems
    }

    fn validate_into(&self, path: &str, value: &Value, problems: &mut Vec<String>) {
        if !self.schema_type.matches(value) {
            problems.push(format!(
                "{path}: expected {}, got {}",
                self.schema_type,
                type_name(value)
            ));
            return;
        }
        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                problems.push(format!("{path}: value {value} is not one of the allowed values"));
            }
        }
        match value {
            Value::Array(elements) => {
                if let Some(items) = &self.items {
                    for (i, element) in elements.iter().enumerate() {
                        items.validate_into(&format!("{path}[{i}]"), element, problems);
                    }
                }
            }
            Value::Object(fields) => {
                for (name, schema) in &self.properties {
                    let child = format!("{path}.{name}");
                    match fields.get(name) {
                        Some(v) => schema.validate_into(&child, v, problems),
                        None if schema.required => {
                            problems.push(format!("{child}: missing required field"))
                        }
                        None => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One named parameter of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParameter {
    pub name: String,
    pub schema: JsonSchema,
}

impl CommandParameter {
    pub fn new(name: impl Into<String>, schema: JsonSchema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// `name: type` with a trailing `?` for optional parameters.
    pub fn signature(&self) -> String {
        let optional = if self.schema.required { "" } else { "?" };
        format!("{}{}: {}", self.name, optional, self.schema.schema_type)
    }
}
