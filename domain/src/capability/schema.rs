//! Compiled input-schema validation
//!
//! Tool servers describe their arguments with a JSON Schema subset. Each
//! capability's schema is compiled once into a [`SchemaValidator`] and the
//! compiled form is reused for every call, so a malformed schema is reported
//! at discovery time rather than on the first invocation.
//!
//! Supported keywords: `type` (string or array of strings), `properties`,
//! `required`, `additionalProperties` (boolean), `items`, `enum`. Other
//! keywords are ignored.

use crate::core::error::DomainError;
use serde_json::Value;

/// JSON value kinds recognised by the `type` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(JsonType::String),
            "number" => Some(JsonType::Number),
            "integer" => Some(JsonType::Integer),
            "boolean" => Some(JsonType::Boolean),
            "array" => Some(JsonType::Array),
            "object" => Some(JsonType::Object),
            "null" => Some(JsonType::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Null => "null",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            JsonType::Boolean => value.is_boolean(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
            JsonType::Null => value.is_null(),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Arguments rejected by a capability's input schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Location of the offending value, e.g. `$.filters[2].field`.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for SchemaViolation {}

#[derive(Debug, Clone, Default)]
struct Node {
    /// Empty means any type is accepted.
    types: Vec<JsonType>,
    enum_values: Option<Vec<Value>>,
    properties: Vec<(String, Node)>,
    required: Vec<String>,
    additional_properties: bool,
    items: Option<Box<Node>>,
}

impl Node {
    fn compile(schema: &Value, path: &str) -> Result<Node, DomainError> {
        let obj = match schema {
            // `true` accepts anything
            Value::Bool(true) => return Ok(Node::any()),
            Value::Object(obj) => obj,
            other => {
                return Err(DomainError::InvalidSchema(format!(
                    "{}: schema must be an object, got {}",
                    path,
                    describe(other)
                )));
            }
        };

        let mut node = Node::any();

        match obj.get("type") {
            None => {}
            Some(Value::String(name)) => node.types.push(parse_type(name, path)?),
            Some(Value::Array(names)) => {
                for name in names {
                    let name = name.as_str().ok_or_else(|| {
                        DomainError::InvalidSchema(format!("{}: type entries must be strings", path))
                    })?;
                    node.types.push(parse_type(name, path)?);
                }
            }
            Some(other) => {
                return Err(DomainError::InvalidSchema(format!(
                    "{}: type must be a string or array, got {}",
                    path,
                    describe(other)
                )));
            }
        }

        if let Some(values) = obj.get("enum") {
            let values = values.as_array().ok_or_else(|| {
                DomainError::InvalidSchema(format!("{}: enum must be an array", path))
            })?;
            node.enum_values = Some(values.clone());
        }

        if let Some(props) = obj.get("properties") {
            let props = props.as_object().ok_or_else(|| {
                DomainError::InvalidSchema(format!("{}: properties must be an object", path))
            })?;
            for (name, sub) in props {
                let child = Node::compile(sub, &format!("{}.{}", path, name))?;
                node.properties.push((name.clone(), child));
            }
        }

        if let Some(required) = obj.get("required") {
            let required = required.as_array().ok_or_else(|| {
                DomainError::InvalidSchema(format!("{}: required must be an array", path))
            })?;
            for name in required {
                let name = name.as_str().ok_or_else(|| {
                    DomainError::InvalidSchema(format!("{}: required entries must be strings", path))
                })?;
                node.required.push(name.to_string());
            }
        }

        match obj.get("additionalProperties") {
            None | Some(Value::Object(_)) => {}
            Some(Value::Bool(allowed)) => node.additional_properties = *allowed,
            Some(other) => {
                return Err(DomainError::InvalidSchema(format!(
                    "{}: additionalProperties must be a boolean or schema, got {}",
                    path,
                    describe(other)
                )));
            }
        }

        if let Some(items) = obj.get("items") {
            node.items = Some(Box::new(Node::compile(items, &format!("{}[]", path))?));
        }

        Ok(node)
    }

    fn any() -> Node {
        Node {
            additional_properties: true,
            ..Node::default()
        }
    }

    fn check(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        let violation = |message: String| SchemaViolation {
            path: path.to_string(),
            message,
        };

        if !self.types.is_empty() && !self.types.iter().any(|t| t.matches(value)) {
            let expected: Vec<&str> = self.types.iter().map(|t| t.as_str()).collect();
            return Err(violation(format!(
                "expected {}, got {}",
                expected.join(" or "),
                describe(value)
            )));
        }

        if let Some(allowed) = &self.enum_values
            && !allowed.contains(value)
        {
            return Err(violation(format!("value {} is not one of the allowed values", value)));
        }

        if let Value::Object(map) = value {
            for name in &self.required {
                if !map.contains_key(name) {
                    return Err(violation(format!("missing required property '{}'", name)));
                }
            }
            for (key, sub_value) in map {
                let child_path = format!("{}.{}", path, key);
                match self.properties.iter().find(|(name, _)| name == key) {
                    Some((_, child)) => child.check(sub_value, &child_path)?,
                    None if !self.additional_properties => {
                        return Err(violation(format!("unknown property '{}'", key)));
                    }
                    None => {}
                }
            }
        }

        if let (Value::Array(elements), Some(items)) = (value, &self.items) {
            for (i, element) in elements.iter().enumerate() {
                items.check(element, &format!("{}[{}]", path, i))?;
            }
        }

        Ok(())
    }
}

fn parse_type(name: &str, path: &str) -> Result<JsonType, DomainError> {
    JsonType::parse(name)
        .ok_or_else(|| DomainError::InvalidSchema(format!("{}: unknown type '{}'", path, name)))
}

/// Validator compiled from one capability's input schema.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    root: Node,
}

impl SchemaValidator {
    /// Compile a schema. Fails if the schema itself is malformed.
    pub fn compile(schema: &Value) -> Result<Self, DomainError> {
        Ok(Self {
            root: Node::compile(schema, "$")?,
        })
    }

    /// Check a set of arguments. The first violation found is reported.
    pub fn validate(&self, arguments: &Value) -> Result<(), SchemaViolation> {
        self.root.check(arguments, "$")
    }
}
