//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type,
//! enabling type validation before any side effect happens.

use std::collections::HashMap;
use std::fmt;

use serde_json::json;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// Nested block with its own named fields
    Struct(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::Struct(fields), Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => field.attr_type.validate(v).map_err(|e| {
                            TypeError::FieldError {
                                field: field.name.clone(),
                                inner: Box::new(e),
                            }
                        })?,
                        None if field.required && field.default.is_none() => {
                            return Err(TypeError::MissingRequired {
                                name: field.name.clone(),
                            });
                        }
                        None => {}
                    }
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::Struct(_) => "Struct".to_string(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeType::Enum(variants) => json!({ "type": "string", "enum": variants }),
            AttributeType::Custom { base, .. } => base.to_json(),
            AttributeType::Struct(fields) => properties_to_json(fields.iter()),
            AttributeType::String => json!({ "type": "string" }),
            AttributeType::Bool => json!({ "type": "boolean" }),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Field '{field}': {inner}")]
    FieldError { field: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Secret material (passwords, keys) that must not be echoed back
    pub sensitive: bool,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            default: None,
            description: None,
            sensitive: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = self.attr_type.to_json();
        if let Some(map) = obj.as_object_mut() {
            if let Some(desc) = &self.description {
                map.insert("description".to_string(), json!(desc));
            }
            if let Some(default) = &self.default {
                map.insert("default".to_string(), default.to_json());
            }
            if self.sensitive {
                map.insert("secret".to_string(), json!(true));
            }
        }
        obj
    }
}

fn properties_to_json<'a>(
    attributes: impl Iterator<Item = &'a AttributeSchema>,
) -> serde_json::Value {
    let mut attributes: Vec<_> = attributes.collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    let properties: serde_json::Map<_, _> = attributes
        .iter()
        .map(|a| (a.name.clone(), a.to_json()))
        .collect();
    let required: Vec<_> = attributes
        .iter()
        .filter(|a| a.required)
        .map(|a| a.name.clone())
        .collect();

    json!({ "type": "object", "properties": properties, "required": required })
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute
        for (name, value) in attributes {
            if let Some(schema) = self.attributes.get(name)
                && let Err(e) = schema.attr_type.validate(value)
            {
                errors.push(e);
            }
            // Unknown attributes are allowed (outputs ride along with inputs)
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// JSON description of this schema, attributes sorted by name
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = properties_to_json(self.attributes.values());
        if let Some(map) = obj.as_object_mut() {
            map.insert("resourceType".to_string(), json!(self.resource_type));
            if let Some(desc) = &self.description {
                map.insert("description".to_string(), json!(desc));
            }
        }
        obj
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// String that must contain at least one non-whitespace character
    pub fn non_empty_string() -> AttributeType {
        AttributeType::Custom {
            name: "NonEmptyString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if s.trim().is_empty() => {
                    Err("Value must not be empty".to_string())
                }
                _ => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["a".to_string(), "b".to_string()]);
        assert!(t.validate(&Value::String("a".to_string())).is_ok());
        assert!(t.validate(&Value::String("c".to_string())).is_err());
        assert!(t.validate(&Value::String("Type.a".to_string())).is_err());
    }

    #[test]
    fn validate_non_empty_string() {
        let t = types::non_empty_string();
        assert!(t.validate(&Value::String("x".to_string())).is_ok());
        assert!(t.validate(&Value::String("  ".to_string())).is_err());
        assert!(t.validate(&Value::Bool(true)).is_err());
    }

    #[test]
    fn validate_struct_reports_missing_field() {
        let t = AttributeType::Struct(vec![
            AttributeSchema::new("url", AttributeType::String).required(),
            AttributeSchema::new("username", AttributeType::String),
        ]);

        let mut block = HashMap::new();
        block.insert("username".to_string(), Value::String("me".to_string()));
        let err = t.validate(&Value::Map(block)).unwrap_err();
        assert!(matches!(err, TypeError::MissingRequired { ref name } if name == "url"));
    }

    #[test]
    fn validate_struct_wraps_field_errors() {
        let t = AttributeType::Struct(vec![AttributeSchema::new(
            "insecureHttpAllowed",
            AttributeType::Bool,
        )]);

        let mut block = HashMap::new();
        block.insert(
            "insecureHttpAllowed".to_string(),
            Value::String("yes".to_string()),
        );
        let err = t.validate(&Value::Map(block)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Field 'insecureHttpAllowed': Type mismatch: expected Bool, got String"
        );
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("my-resource".to_string()));
        attrs.insert("enabled".to_string(), Value::Bool(true));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("enabled".to_string(), Value::Int(1));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors[0].to_string(), "Type mismatch: expected Bool, got Int");
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("app")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let attrs = HashMap::new();
        let result = schema.validate(&attrs);
        assert_eq!(result.unwrap_err().len(), 1);
    }

    #[test]
    fn schema_json_lists_required_and_secrets() {
        let schema = ResourceSchema::new("app")
            .with_description("An application")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("password", AttributeType::String).sensitive());

        let json = schema.to_json();
        assert_eq!(json["resourceType"], "app");
        assert_eq!(json["required"], serde_json::json!(["name"]));
        assert_eq!(json["properties"]["password"]["secret"], true);
        assert_eq!(json["description"], "An application");
    }
}
