//! The schema document and the validator seam.
//!
//! Structural validation is pluggable through [`SchemaValidator`]. The
//! bundled [`BasicValidator`] understands the top-level subset of JSON
//! Schema most databases use: `required`, per-property `type` and `enum`,
//! and `additionalProperties: false`. Reserved (`_`-prefixed) fields are
//! stripped before any validator sees a record.

use crate::error::{Error, Result};
use crate::record::{Record, is_reserved};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One validation message tied to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field; empty when the message concerns the whole record.
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Result of validating one value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationOutcome {
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        ValidationOutcome {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// A structural validator compiled against a schema.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &Schema, data: &Value) -> ValidationOutcome;
}

/// The contents of `schema.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema(Value);

impl Schema {
    /// Wrap a schema document. It must be a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_object() {
            Ok(Schema(value))
        } else {
            Err(Error::invalid_input("schema", "schema must be a JSON object"))
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.0.get("properties").and_then(Value::as_object)
    }

    pub fn required(&self) -> Vec<&str> {
        self.0
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Reject schemas that try to define fields in the reserved namespace.
    pub fn check_definition(&self) -> Result<()> {
        let declared = self
            .properties()
            .into_iter()
            .flat_map(|props| props.keys().map(String::as_str))
            .chain(self.required());
        for name in declared {
            if is_reserved(name) {
                return Err(Error::invalid_input(
                    "schema",
                    format!("field {name:?} uses the reserved `_` prefix"),
                ));
            }
        }
        if let Some(props) = self.0.get("properties") {
            if !props.is_object() {
                return Err(Error::invalid_input("schema", "`properties` must be an object"));
            }
        }
        Ok(())
    }

    /// Fill absent fields from each property's `default`.
    pub fn apply_defaults(&self, fields: &mut Map<String, Value>) {
        let Some(props) = self.properties() else {
            return;
        };
        for (name, spec) in props {
            if fields.contains_key(name) {
                continue;
            }
            if let Some(default) = spec.get("default") {
                fields.insert(name.clone(), default.clone());
            }
        }
    }

    /// The part of a record a validator is allowed to see.
    pub fn user_view(record: &Record) -> Value {
        Value::Object(record.user_fields())
    }
}

/// Validator for the common top-level subset of JSON Schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl SchemaValidator for BasicValidator {
    fn validate(&self, schema: &Schema, data: &Value) -> ValidationOutcome {
        let Some(object) = data.as_object() else {
            return ValidationOutcome::from_errors(vec![FieldError::new(
                "",
                "record must be a JSON object",
            )]);
        };

        let mut errors = Vec::new();

        for name in schema.required() {
            if !object.contains_key(name) {
                errors.push(FieldError::new(name, "is required"));
            }
        }

        let props = schema.properties();
        for (name, value) in object {
            match props.and_then(|p| p.get(name)) {
                Some(spec) => check_property(name, value, spec, &mut errors),
                None if additional_forbidden(schema) => {
                    errors.push(FieldError::new(name.as_str(), "is not allowed by the schema"));
                }
                None => {}
            }
        }

        ValidationOutcome::from_errors(errors)
    }
}

fn additional_forbidden(schema: &Schema) -> bool {
    schema.as_value().get("additionalProperties") == Some(&Value::Bool(false))
}

fn check_property(name: &str, value: &Value, spec: &Value, errors: &mut Vec<FieldError>) {
    if let Some(expected) = spec.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| has_type(value, t)) {
            errors.push(FieldError::new(
                name,
                format!("must be of type {}", allowed.join(" or ")),
            ));
        }
    }

    if let Some(Value::Array(options)) = spec.get("enum") {
        if !options.contains(value) {
            errors.push(FieldError::new(name, "must be one of the allowed values"));
        }
    }
}

fn has_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
