//! JSON Schema validation
//!
//! Serialized type descriptors are validated against a built-in JSON Schema
//! before they are reified, so a malformed document is reported with the
//! JSON pointer of the offending element instead of failing half way
//! through reification.

use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::value::Value;

const DESCRIPTOR_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "stencil type descriptor",
  "anyOf": [{ "$ref": "#/definitions/descriptor" }],
  "definitions": {
    "descriptor": {
      "anyOf": [
        { "$ref": "#/definitions/scalar" },
        { "$ref": "#/definitions/enum" },
        { "$ref": "#/definitions/list" },
        { "$ref": "#/definitions/map" },
        { "$ref": "#/definitions/structRef" },
        { "$ref": "#/definitions/struct" },
        { "$ref": "#/definitions/choice" },
        { "$ref": "#/definitions/extension" }
      ]
    },
    "scalar": {
      "type": "array",
      "items": [{ "enum": ["String", "Integer", "Float", "Boolean"] }],
      "minItems": 1,
      "maxItems": 1
    },
    "enum": {
      "type": "array",
      "items": [
        { "const": "Enum" },
        { "type": "string" },
        { "type": "array", "items": { "type": "string" } }
      ],
      "minItems": 3,
      "maxItems": 3
    },
    "list": {
      "type": "array",
      "items": [{ "const": "List" }, { "$ref": "#/definitions/descriptor" }],
      "minItems": 2,
      "maxItems": 2
    },
    "map": {
      "type": "array",
      "items": [
        { "const": "Map" },
        { "$ref": "#/definitions/descriptor" },
        { "$ref": "#/definitions/descriptor" }
      ],
      "minItems": 3,
      "maxItems": 3
    },
    "structRef": {
      "type": "array",
      "items": [{ "const": "Struct" }, { "type": "string" }],
      "minItems": 2,
      "maxItems": 2
    },
    "struct": {
      "type": "array",
      "items": [
        { "const": "Struct" },
        { "type": "string" },
        { "type": "array", "items": { "$ref": "#/definitions/field" } }
      ],
      "minItems": 3,
      "maxItems": 3
    },
    "field": {
      "type": "array",
      "items": [
        { "type": "string" },
        {
          "type": "array",
          "items": [
            { "type": "boolean" },
            {},
            { "type": "boolean" },
            { "$ref": "#/definitions/descriptor" }
          ],
          "minItems": 4,
          "maxItems": 4
        }
      ],
      "minItems": 2,
      "maxItems": 2
    },
    "choice": {
      "type": "array",
      "items": [
        { "const": "Choice" },
        { "type": "string" },
        { "type": "array", "items": { "$ref": "#/definitions/descriptor" } }
      ],
      "minItems": 3,
      "maxItems": 3
    },
    "extension": {
      "type": "array",
      "items": [
        {
          "type": "string",
          "not": {
            "enum": ["String", "Integer", "Float", "Boolean", "Enum", "List", "Map", "Struct", "Choice"]
          }
        }
      ],
      "minItems": 1
    }
  }
}"##;

/// A compiled JSON Schema
#[derive(Debug, Clone)]
pub struct Schema {
    /// The JSON Schema as a serde_json::Value
    schema: serde_json::Value,
    /// Compiled JSON Schema validator (wrapped in Arc for Clone)
    compiled: Arc<jsonschema::Validator>,
}

impl Schema {
    /// The schema every serialized type descriptor must satisfy
    pub fn descriptor() -> &'static Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::from_json(DESCRIPTOR_SCHEMA).expect("descriptor schema is valid")
        })
    }

    /// Load a schema from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::parse(format!("Invalid JSON schema: {}", e)))?;
        Self::from_value(schema)
    }

    /// Load a schema from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let schema: serde_json::Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::parse(format!("Invalid YAML schema: {}", e)))?;
        Self::from_value(schema)
    }

    /// Create a schema from a serde_json::Value
    pub fn from_value(schema: serde_json::Value) -> Result<Self> {
        let compiled = jsonschema::validator_for(&schema)
            .map_err(|e| Error::parse(format!("Invalid JSON Schema: {}", e)))?;
        Ok(Self {
            schema,
            compiled: Arc::new(compiled),
        })
    }

    /// Validate a Value against this schema
    ///
    /// Returns Ok(()) if valid, or an error with details about the first validation failure.
    pub fn validate(&self, value: &Value) -> Result<()> {
        let json_value = value.to_json();
        let mut errors = self.compiled.iter_errors(&json_value);
        if let Some(error) = errors.next() {
            let path = error.instance_path.to_string();
            let message = error.to_string();
            return Err(Error::validation(
                if path.is_empty() { "<root>" } else { &path },
                &message,
            ));
        }
        Ok(())
    }

    /// Validate and collect all errors (instead of failing on first)
    pub fn validate_collect(&self, value: &Value) -> Vec<ValidationError> {
        let json_value = value.to_json();
        self.compiled
            .iter_errors(&json_value)
            .map(|e| ValidationError {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect()
    }

    /// Get the raw schema value
    pub fn as_value(&self) -> &serde_json::Value {
        &self.schema
    }
}

/// A single validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the invalid value (e.g., "/2/0/1")
    pub path: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}
